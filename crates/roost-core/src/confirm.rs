//! Human-in-the-loop approval for `Confirm`-tier commands.
//!
//! The gate hands a [`Resolver`] to the approval surface and waits on the paired one-shot
//! receiver, racing it against a hard deadline. Whatever happens first decides the outcome;
//! everything else is ignored.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use roost_tools::Tier;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::config::ConfirmConfig;

/// Final outcome of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
    TimedOut,
}

impl Decision {
    #[must_use]
    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }

    /// Result string recorded in the audit log for a non-approval.
    #[must_use]
    pub fn audit_result(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "User denied",
            Self::TimedOut => "timeout",
        }
    }
}

/// What the approval surface shows the requester.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub command: String,
    pub tier: Tier,
    pub reason: String,
    /// Only this user may answer.
    pub requester: String,
    pub created_at: Instant,
    /// How long the surface keeps its controls live before expiring them.
    pub display_timeout: Duration,
    /// Instant after which the gate stops waiting.
    pub deadline: Instant,
}

impl ConfirmationRequest {
    /// Plain-text prompt for surfaces without rich formatting.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        let mut text = format!(
            "⚠️ Confirmation required ({})\nCommand: `{}`",
            self.tier, self.command
        );
        if !self.reason.is_empty() {
            text.push_str("\nReason: ");
            text.push_str(&self.reason);
        }
        text.push_str(&format!(
            "\nApprove within {}s.",
            self.display_timeout.as_secs()
        ));
        text
    }
}

/// One-shot answer handle given to the approval surface.
///
/// Clones share the same slot: the first of `approve`, `deny`, or `expire` wins and later calls
/// are no-ops. Dropping every clone without answering counts as a denial.
#[derive(Debug, Clone)]
pub struct Resolver {
    slot: Arc<Mutex<Option<oneshot::Sender<Decision>>>>,
}

impl Resolver {
    fn pair() -> (Self, oneshot::Receiver<Decision>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Returns `true` if this call settled the request.
    pub fn approve(&self) -> bool {
        self.resolve(Decision::Approved)
    }

    /// Returns `true` if this call settled the request.
    pub fn deny(&self) -> bool {
        self.resolve(Decision::Denied)
    }

    /// Mark the prompt as expired. Returns `true` if this call settled the request.
    pub fn expire(&self) -> bool {
        self.resolve(Decision::TimedOut)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.lock().map_or(true, |s| s.is_none())
    }

    fn resolve(&self, decision: Decision) -> bool {
        let sender = self.slot.lock().ok().and_then(|mut s| s.take());
        sender.is_some_and(|tx| tx.send(decision).is_ok())
    }
}

/// Issues confirmation requests and enforces their deadline.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationGate {
    display_timeout: Duration,
    hard_timeout: Duration,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::from_config(&ConfirmConfig::default())
    }
}

impl ConfirmationGate {
    #[must_use]
    pub fn new(display_timeout: Duration, hard_timeout: Duration) -> Self {
        Self {
            display_timeout,
            hard_timeout: hard_timeout.max(display_timeout),
        }
    }

    #[must_use]
    pub fn from_config(config: &ConfirmConfig) -> Self {
        Self::new(
            Duration::from_secs(config.display_timeout_secs),
            Duration::from_secs(config.hard_timeout_secs),
        )
    }

    #[must_use]
    pub fn hard_timeout(&self) -> Duration {
        self.hard_timeout
    }

    /// Ask `requester` to approve `command` and wait for the answer.
    ///
    /// Returns [`Decision::TimedOut`] once the hard deadline passes and [`Decision::Denied`]
    /// when the surface fails, drops the resolver, or the turn is cancelled.
    pub async fn request<C: Channel>(
        &self,
        channel: &mut C,
        command: &str,
        tier: Tier,
        reason: &str,
        requester: &str,
        cancel: &CancellationToken,
    ) -> Decision {
        let now = Instant::now();
        let request = ConfirmationRequest {
            command: command.to_owned(),
            tier,
            reason: reason.to_owned(),
            requester: requester.to_owned(),
            created_at: now,
            display_timeout: self.display_timeout,
            deadline: now + self.hard_timeout,
        };
        let (resolver, rx) = Resolver::pair();

        let wait = async {
            if let Err(e) = channel.request_approval(&request, resolver).await {
                tracing::warn!(command, "approval prompt failed: {e}");
                return Decision::Denied;
            }
            rx.await.unwrap_or(Decision::Denied)
        };

        let decision = tokio::select! {
            result = tokio::time::timeout_at(request.deadline, wait) => {
                result.unwrap_or(Decision::TimedOut)
            }
            () = cancel.cancelled() => Decision::Denied,
        };

        tracing::info!(command, user_id = requester, ?decision, "confirmation resolved");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ApprovalBehavior, MockChannel};

    fn gate() -> ConfirmationGate {
        ConfirmationGate::new(Duration::from_secs(30), Duration::from_secs(35))
    }

    async fn ask(channel: &mut MockChannel) -> Decision {
        gate()
            .request(
                channel,
                "mkdir foo",
                Tier::Confirm,
                "setup",
                "u1",
                &CancellationToken::new(),
            )
            .await
    }

    #[test]
    fn resolver_fires_at_most_once() {
        let (resolver, mut rx) = Resolver::pair();
        let other = resolver.clone();
        assert!(!resolver.is_resolved());
        assert!(resolver.approve());
        assert!(!other.deny());
        assert!(!resolver.expire());
        assert!(other.is_resolved());
        assert_eq!(rx.try_recv().unwrap(), Decision::Approved);
    }

    #[test]
    fn dropped_resolver_closes_receiver() {
        let (resolver, mut rx) = Resolver::pair();
        drop(resolver);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn audit_results() {
        assert_eq!(Decision::Denied.audit_result(), "User denied");
        assert_eq!(Decision::TimedOut.audit_result(), "timeout");
        assert!(Decision::Approved.is_approved());
        assert!(!Decision::TimedOut.is_approved());
    }

    #[test]
    fn hard_timeout_never_below_display() {
        let gate = ConfirmationGate::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(gate.hard_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn approval() {
        let mut channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Approve]);
        assert_eq!(ask(&mut channel).await, Decision::Approved);
        let requests = channel.approval_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "mkdir foo");
        assert_eq!(requests[0].requester, "u1");
        assert_eq!(requests[0].display_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn denial() {
        let mut channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Deny]);
        assert_eq!(ask(&mut channel).await, Decision::Denied);
    }

    #[tokio::test]
    async fn surface_expiry() {
        let mut channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Expire]);
        assert_eq!(ask(&mut channel).await, Decision::TimedOut);
    }

    #[tokio::test]
    async fn dropped_resolver_is_denial() {
        let mut channel =
            MockChannel::default().with_approvals(vec![ApprovalBehavior::DropResolver]);
        assert_eq!(ask(&mut channel).await, Decision::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_at_hard_deadline() {
        let mut channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Ignore]);
        let start = Instant::now();
        assert_eq!(ask(&mut channel).await, Decision::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn late_approval_after_deadline_is_ignored() {
        let mut channel = MockChannel::default()
            .with_approvals(vec![ApprovalBehavior::ApproveAfter(Duration::from_secs(40))]);
        assert_eq!(ask(&mut channel).await, Decision::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn approval_before_deadline_wins() {
        let mut channel = MockChannel::default()
            .with_approvals(vec![ApprovalBehavior::ApproveAfter(Duration::from_secs(10))]);
        assert_eq!(ask(&mut channel).await, Decision::Approved);
    }

    #[tokio::test]
    async fn cancellation_denies() {
        let mut channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Ignore]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let decision = gate()
            .request(&mut channel, "mkdir x", Tier::Confirm, "", "u1", &cancel)
            .await;
        assert_eq!(decision, Decision::Denied);
    }

    #[test]
    fn prompt_text_mentions_command_and_reason() {
        let now = Instant::now();
        let request = ConfirmationRequest {
            command: "pip install requests".into(),
            tier: Tier::Confirm,
            reason: "needed for script".into(),
            requester: "u1".into(),
            created_at: now,
            display_timeout: Duration::from_secs(30),
            deadline: now + Duration::from_secs(35),
        };
        let text = request.prompt_text();
        assert!(text.contains("`pip install requests`"));
        assert!(text.contains("needed for script"));
        assert!(text.contains("30s"));
    }
}
