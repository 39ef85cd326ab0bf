use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::Tier;

/// Name of the single tool the model may invoke.
pub const EXECUTE_COMMAND: &str = "execute_command";

/// Where a tool call was found in the model's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOrigin {
    /// Provider's native tool-call channel.
    Structured,
    /// JSON embedded in free text.
    ExtractedText,
}

/// Arguments of an `execute_command` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    pub command: String,
    #[serde(default)]
    pub reason: String,
}

/// A normalized `execute_command` invocation, whatever shape the model produced it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: CommandArgs,
    pub origin: CallOrigin,
}

impl ToolCall {
    #[must_use]
    pub fn new(arguments: CommandArgs, origin: CallOrigin) -> Self {
        Self {
            name: EXECUTE_COMMAND.to_owned(),
            arguments,
            origin,
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.arguments.command
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.arguments.reason
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Executed,
    Blocked,
    PendingConfirm,
    Error,
}

impl ExecStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Blocked => "blocked",
            Self::PendingConfirm => "pending_confirm",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor reports back. Serialized verbatim into the tool-result message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecStatus,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    #[must_use]
    pub fn executed(tier: Tier, output: String, exit_code: Option<i32>) -> Self {
        Self {
            status: ExecStatus::Executed,
            tier,
            reason: None,
            output: Some(output),
            exit_code,
        }
    }

    #[must_use]
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::Blocked,
            tier: Tier::Blocked,
            reason: Some(reason.into()),
            output: None,
            exit_code: None,
        }
    }

    #[must_use]
    pub fn pending_confirm(tier: Tier) -> Self {
        Self {
            status: ExecStatus::PendingConfirm,
            tier,
            reason: None,
            output: None,
            exit_code: None,
        }
    }

    #[must_use]
    pub fn error(tier: Tier, reason: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::Error,
            tier,
            reason: Some(reason.into()),
            output: None,
            exit_code: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    /// JSON text used as the tool-result message content.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"status\":\"error\",\"reason\":\"result serialization failed: {e}\"}}")
        })
    }
}

/// Errors that can occur during command execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("execution failed: {0}")]
    Execution(#[from] std::io::Error),
}

/// Backend that actually runs commands.
///
/// Implementations must re-validate: `execute` never runs anything above `Safe`, and
/// `confirm_execute` never runs anything `Blocked`.
pub trait CommandExecutor: Send + Sync {
    /// Run a command the caller believes is `Safe`.
    ///
    /// Returns `pending_confirm` for `Confirm`-tier commands and `blocked` for `Blocked` ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn execute(
        &self,
        command: &str,
        user_id: &str,
        reason: &str,
    ) -> impl Future<Output = Result<ExecutionResult, ToolError>> + Send;

    /// Run a `Confirm`-tier command after the user approved it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn confirm_execute(
        &self,
        command: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<ExecutionResult, ToolError>> + Send;
}

/// Truncate output longer than `max_chars` bytes, keeping the head and tail.
#[must_use]
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.len() <= max_chars {
        return output.to_string();
    }

    let half = max_chars / 2;
    let mut head_end = half;
    while !output.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = output.len() - half;
    while !output.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    let truncated = tail_start - head_end;

    format!(
        "{}\n\n... [truncated {truncated} chars] ...\n\n{}",
        &output[..head_end],
        &output[tail_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecStatus::PendingConfirm).unwrap(),
            "\"pending_confirm\""
        );
        assert_eq!(ExecStatus::Executed.to_string(), "executed");
    }

    #[test]
    fn result_json_omits_empty_fields() {
        let json = ExecutionResult::blocked("nope").to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "blocked");
        assert_eq!(value["tier"], "blocked");
        assert_eq!(value["reason"], "nope");
        assert!(value.get("output").is_none());
    }

    #[test]
    fn executed_result_carries_output() {
        let result = ExecutionResult::executed(Tier::Safe, "hi\n".into(), Some(0));
        let value: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(value["output"], "hi\n");
        assert_eq!(value["exit_code"], 0);
    }

    #[test]
    fn tool_call_defaults_name() {
        let call = ToolCall::new(
            CommandArgs {
                command: "ls".into(),
                reason: "look".into(),
            },
            CallOrigin::ExtractedText,
        );
        assert_eq!(call.name, EXECUTE_COMMAND);
        assert_eq!(call.command(), "ls");
        assert_eq!(call.reason(), "look");
    }

    #[test]
    fn truncate_short_output_unchanged() {
        assert_eq!(truncate_output("short", 100), "short");
    }

    #[test]
    fn truncate_long_output_keeps_head_and_tail() {
        let text = format!("{}{}", "a".repeat(500), "z".repeat(500));
        let out = truncate_output(&text, 100);
        assert!(out.starts_with("aaaa"));
        assert!(out.ends_with("zzzz"));
        assert!(out.contains("truncated 900 chars"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "é".repeat(200);
        let out = truncate_output(&text, 51);
        assert!(out.contains("truncated"));
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "command timed out after 30s");
    }
}
