//! Recording doubles for the channel and executor seams.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roost_tools::{
    CommandExecutor, CommandPolicy, ExecutionResult, Tier, ToolError,
};

use crate::channel::{Channel, ChannelError, ChannelMessage, MessageId};
use crate::confirm::{ConfirmationRequest, Resolver};

/// How [`MockChannel`] answers the next approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalBehavior {
    Approve,
    Deny,
    Expire,
    /// Keep the resolver alive without answering.
    Ignore,
    /// Drop the resolver without answering.
    DropResolver,
    /// Approve from a background task after the given delay.
    ApproveAfter(Duration),
}

/// Everything the agent did to the transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Sent { id: MessageId, text: String },
    Edited { id: MessageId, text: String },
    Deleted { id: MessageId },
    Approval { command: String, requester: String },
}

#[derive(Debug, Default)]
struct ChannelState {
    inbox: VecDeque<ChannelMessage>,
    events: Vec<ChannelEvent>,
    approvals: VecDeque<ApprovalBehavior>,
    requests: Vec<ConfirmationRequest>,
    held: Vec<Resolver>,
    next_id: u64,
}

/// Scripted inbox plus a log of every outbound action.
///
/// Clones share state, so a test can keep one handle while the agent owns another.
/// Approval prompts with no scripted behavior left are denied.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    #[must_use]
    pub fn new(messages: Vec<ChannelMessage>) -> Self {
        let channel = Self::default();
        channel.state.lock().unwrap().inbox.extend(messages);
        channel
    }

    #[must_use]
    pub fn with_approvals(self, approvals: Vec<ApprovalBehavior>) -> Self {
        self.state.lock().unwrap().approvals.extend(approvals);
        self
    }

    #[must_use]
    pub fn events(&self) -> Vec<ChannelEvent> {
        self.state.lock().unwrap().events.clone()
    }

    #[must_use]
    pub fn approval_requests(&self) -> Vec<ConfirmationRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Texts passed to `send`, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ChannelEvent::Sent { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Final text of every message still on screen, in send order.
    #[must_use]
    pub fn visible(&self) -> Vec<String> {
        let mut shown: Vec<(MessageId, String)> = Vec::new();
        for event in self.events() {
            match event {
                ChannelEvent::Sent { id, text } => shown.push((id, text)),
                ChannelEvent::Edited { id, text } => {
                    if let Some(entry) = shown.iter_mut().find(|(i, _)| *i == id) {
                        entry.1 = text;
                    }
                }
                ChannelEvent::Deleted { id } => shown.retain(|(i, _)| *i != id),
                ChannelEvent::Approval { .. } => {}
            }
        }
        shown.into_iter().map(|(_, text)| text).collect()
    }

    #[must_use]
    pub fn edit_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Edited { .. }))
            .count()
    }
}

impl Channel for MockChannel {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        Ok(self.state.lock().unwrap().inbox.pop_front())
    }

    async fn send(&mut self, text: &str) -> Result<MessageId, ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        state.events.push(ChannelEvent::Sent {
            id,
            text: text.to_owned(),
        });
        Ok(id)
    }

    async fn edit(&mut self, id: MessageId, text: &str) -> Result<(), ChannelError> {
        self.state.lock().unwrap().events.push(ChannelEvent::Edited {
            id,
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn delete(&mut self, id: MessageId) -> Result<(), ChannelError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(ChannelEvent::Deleted { id });
        Ok(())
    }

    async fn request_approval(
        &mut self,
        request: &ConfirmationRequest,
        resolver: Resolver,
    ) -> Result<(), ChannelError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.events.push(ChannelEvent::Approval {
                command: request.command.clone(),
                requester: request.requester.clone(),
            });
            state.requests.push(request.clone());
            state.approvals.pop_front().unwrap_or(ApprovalBehavior::Deny)
        };
        match behavior {
            ApprovalBehavior::Approve => {
                resolver.approve();
            }
            ApprovalBehavior::Deny => {
                resolver.deny();
            }
            ApprovalBehavior::Expire => {
                resolver.expire();
            }
            ApprovalBehavior::Ignore => self.state.lock().unwrap().held.push(resolver),
            ApprovalBehavior::DropResolver => drop(resolver),
            ApprovalBehavior::ApproveAfter(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    resolver.approve();
                });
            }
        }
        Ok(())
    }
}

/// One command the executor actually ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub command: String,
    pub user_id: String,
    pub confirmed: bool,
}

/// Executor that re-validates like the real one but only records what it would run.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    policy: Arc<CommandPolicy>,
    executed: Arc<Mutex<Vec<ExecutedCommand>>>,
    output: String,
    fail: bool,
}

impl MockExecutor {
    #[must_use]
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    /// Every run fails with an I/O error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.executed.lock().unwrap().clone()
    }

    fn run(
        &self,
        command: &str,
        user_id: &str,
        tier: Tier,
        confirmed: bool,
    ) -> Result<ExecutionResult, ToolError> {
        if self.fail {
            return Err(ToolError::Execution(std::io::Error::other("spawn failed")));
        }
        self.executed.lock().unwrap().push(ExecutedCommand {
            command: command.to_owned(),
            user_id: user_id.to_owned(),
            confirmed,
        });
        Ok(ExecutionResult::executed(tier, self.output.clone(), Some(0)))
    }
}

impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        command: &str,
        user_id: &str,
        _reason: &str,
    ) -> Result<ExecutionResult, ToolError> {
        let verdict = self.policy.validate(command);
        match verdict.tier {
            Tier::Blocked => Ok(ExecutionResult::blocked(
                verdict.reason_text().unwrap_or_default(),
            )),
            Tier::Confirm => Ok(ExecutionResult::pending_confirm(Tier::Confirm)),
            Tier::Safe => self.run(command, user_id, Tier::Safe, false),
        }
    }

    async fn confirm_execute(
        &self,
        command: &str,
        user_id: &str,
    ) -> Result<ExecutionResult, ToolError> {
        let verdict = self.policy.validate(command);
        if verdict.tier == Tier::Blocked {
            return Ok(ExecutionResult::blocked(
                verdict.reason_text().unwrap_or_default(),
            ));
        }
        self.run(command, user_id, verdict.tier, true)
    }
}
