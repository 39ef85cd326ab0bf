use roost_llm::{LlmProvider, Message, ToolUseRequest};
use roost_tools::{
    AuditAction, AuditEntry, CallOrigin, CommandExecutor, EXECUTE_COMMAND, ExecStatus,
    ExecutionResult, Tier, ToolCall, ToolError, extractor,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::Agent;
use super::streaming::collect_text;
use crate::channel::{Channel, MessageId};
use crate::confirm::Decision;
use crate::error::AgentError;
use crate::prompt::SUMMARY_INSTRUCTION;

/// Convert a provider-native tool call into a [`ToolCall`].
///
/// Only `execute_command` is accepted. Arguments may arrive as an object or as a JSON string,
/// in any of the shapes the text extractor understands.
pub(super) fn structured_call(request: &ToolUseRequest) -> Option<ToolCall> {
    if request.name != EXECUTE_COMMAND {
        tracing::warn!(name = %request.name, "ignoring call to unknown tool");
        return None;
    }
    let args = match &request.arguments {
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(raw).ok()?;
            extractor::normalize(&parsed)
        }
        other => extractor::normalize(other),
    };
    args.map(|a| ToolCall::new(a, CallOrigin::Structured))
}

fn result_from_error(tier: Tier, err: &ToolError) -> ExecutionResult {
    tracing::warn!(%tier, "executor failed: {err}");
    ExecutionResult::error(tier, err.to_string())
}

fn blocked_notice(command: &str, reason: &str) -> String {
    format!("🚫 Blocked command\nCommand: `{command}`\nTier: blocked\nReason: {reason}")
}

fn denied_notice(command: &str, decision: Decision) -> String {
    match decision {
        Decision::TimedOut => format!("⌛ Confirmation timed out, not running `{command}`"),
        _ => format!("❌ Denied, not running `{command}`"),
    }
}

impl<P: LlmProvider, C: Channel, E: CommandExecutor> Agent<P, C, E> {
    /// Execute every call in order, then summarize once if anything ran.
    pub(super) async fn run_tool_calls(
        &mut self,
        user_id: &str,
        calls: Vec<ToolCall>,
        placeholder: Option<MessageId>,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let executed = self.execute_calls(user_id, &calls, cancel).await?;

        if cancel.is_cancelled() {
            self.finish_cancelled(placeholder, "").await;
            return Ok(());
        }
        if executed == 0 {
            if let Some(id) = placeholder {
                let _ = self.channel.delete(id).await;
            }
            return Ok(());
        }
        self.summarize(user_id, placeholder, cancel).await
    }

    /// Phase 1. Returns how many calls actually reached the executor.
    async fn execute_calls(
        &mut self,
        user_id: &str,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<usize, AgentError> {
        let mut executed = 0;
        for call in calls {
            if cancel.is_cancelled() {
                tracing::info!(user_id, "turn cancelled, skipping remaining tool calls");
                break;
            }
            let span = tracing::info_span!("tool_call", command = %call.command(), origin = ?call.origin);
            let Some(result) = self.dispatch(user_id, call, cancel).instrument(span).await? else {
                continue;
            };

            self.audit
                .log(
                    &AuditEntry::new(user_id, AuditAction::CommandExec, result.status.as_str())
                        .with_command(call.command(), result.tier),
                )
                .await;
            self.store.add_tool_call(
                user_id,
                ToolUseRequest {
                    name: EXECUTE_COMMAND.to_owned(),
                    arguments: serde_json::to_value(&call.arguments).unwrap_or(Value::Null),
                },
            );
            self.store
                .add_tool_result(user_id, EXECUTE_COMMAND, &result.to_json());
            executed += 1;
        }
        Ok(executed)
    }

    /// Validate, gate, and run one call. `None` means it was blocked or not approved.
    async fn dispatch(
        &mut self,
        user_id: &str,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<Option<ExecutionResult>, AgentError> {
        let command = call.command();
        let verdict = self.policy.validate(command);

        let result = match verdict.tier {
            Tier::Blocked => {
                let reason = verdict.reason_text().unwrap_or_default();
                self.report_blocked(user_id, command, &reason).await?;
                return Ok(None);
            }
            Tier::Confirm => match self.confirm_and_run(user_id, call, cancel).await? {
                Some(result) => result,
                None => return Ok(None),
            },
            Tier::Safe => {
                let result = self
                    .executor
                    .execute(command, user_id, call.reason())
                    .await
                    .unwrap_or_else(|e| result_from_error(Tier::Safe, &e));
                if result.status == ExecStatus::PendingConfirm {
                    match self.confirm_and_run(user_id, call, cancel).await? {
                        Some(result) => result,
                        None => return Ok(None),
                    }
                } else {
                    result
                }
            }
        };

        if result.status == ExecStatus::Blocked {
            let reason = result.reason.unwrap_or_default();
            self.report_blocked(user_id, command, &reason).await?;
            return Ok(None);
        }
        Ok(Some(result))
    }

    async fn confirm_and_run(
        &mut self,
        user_id: &str,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<Option<ExecutionResult>, AgentError> {
        let command = call.command();
        let gate = self.gate;
        let decision = gate
            .request(
                &mut self.channel,
                command,
                Tier::Confirm,
                call.reason(),
                user_id,
                cancel,
            )
            .await;

        if !decision.is_approved() {
            self.audit
                .log(
                    &AuditEntry::new(user_id, AuditAction::CommandDenied, decision.audit_result())
                        .with_command(command, Tier::Confirm),
                )
                .await;
            if !cancel.is_cancelled() {
                self.channel.send(&denied_notice(command, decision)).await?;
            }
            return Ok(None);
        }

        let result = self
            .executor
            .confirm_execute(command, user_id)
            .await
            .unwrap_or_else(|e| result_from_error(Tier::Confirm, &e));
        Ok(Some(result))
    }

    async fn report_blocked(
        &mut self,
        user_id: &str,
        command: &str,
        reason: &str,
    ) -> Result<(), AgentError> {
        tracing::warn!(user_id, command, reason, "command blocked");
        self.channel.send(&blocked_notice(command, reason)).await?;
        self.audit
            .log(
                &AuditEntry::new(user_id, AuditAction::CommandBlocked, format!("Blocked: {reason}"))
                    .with_command(command, Tier::Blocked),
            )
            .await;
        Ok(())
    }

    /// Phase 2: one tool-free follow-up call that turns results into prose.
    async fn summarize(
        &mut self,
        user_id: &str,
        placeholder: Option<MessageId>,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let mut messages = self.store.messages(user_id);
        messages.push(Message::user(SUMMARY_INSTRUCTION));

        let span = tracing::info_span!("llm_call", model = %self.model, phase = "summary");
        let outcome = async {
            let stream = self.provider.chat_stream(&self.model, &messages, None).await?;
            collect_text(stream, cancel).await
        }
        .instrument(span)
        .await;

        let (text, cancelled) = match outcome {
            Ok(collected) => collected,
            Err(e) => {
                tracing::error!("summary call failed: {e}");
                let notice = format!("Error: failed to summarize command results: {e}");
                match placeholder {
                    Some(id) => self.safe_edit(id, &notice).await,
                    None => {
                        self.channel.send(&notice).await?;
                    }
                }
                return Ok(());
            }
        };

        if cancelled {
            self.finish_cancelled(placeholder, &text).await;
            return Ok(());
        }
        if text.trim().is_empty() {
            if let Some(id) = placeholder {
                let _ = self.channel.delete(id).await;
            }
            return Ok(());
        }

        self.display_final(placeholder, &text).await?;
        self.store.add_message(user_id, Message::assistant(text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_object_arguments() {
        let call = structured_call(&ToolUseRequest {
            name: "execute_command".into(),
            arguments: json!({"command": "ls", "reason": "look"}),
        })
        .unwrap();
        assert_eq!(call.command(), "ls");
        assert_eq!(call.origin, CallOrigin::Structured);
    }

    #[test]
    fn structured_string_arguments() {
        let call = structured_call(&ToolUseRequest {
            name: "execute_command".into(),
            arguments: Value::String(r#"{"command": "pwd"}"#.into()),
        })
        .unwrap();
        assert_eq!(call.command(), "pwd");
    }

    #[test]
    fn structured_unknown_tool_rejected() {
        assert!(
            structured_call(&ToolUseRequest {
                name: "delete_everything".into(),
                arguments: json!({"command": "ls"}),
            })
            .is_none()
        );
    }

    #[test]
    fn structured_missing_command_rejected() {
        assert!(
            structured_call(&ToolUseRequest {
                name: "execute_command".into(),
                arguments: json!({"reason": "nothing"}),
            })
            .is_none()
        );
    }

    #[test]
    fn notices_name_command() {
        assert!(blocked_notice("rm -rf /", "nope").contains("`rm -rf /`"));
        assert!(denied_notice("mkdir x", Decision::TimedOut).contains("timed out"));
        assert!(denied_notice("mkdir x", Decision::Denied).contains("Denied"));
    }
}
