//! Operating modes, their system prompts, and the tools each mode exposes.

use std::fmt;

use roost_llm::ToolDefinition;
use roost_tools::EXECUTE_COMMAND;
use serde::Deserialize;

const PLANNING_PROMPT: &str = "\
You are Roost, an assistant running directly on the user's local machine.
Reply in the language the user writes in.

## Capabilities
- You can run shell commands on the user's machine with the `execute_command` tool.
- One command per call. Chaining operators (`;`, `&&`, `||`, `|`, backticks, `$(...)`) are \
rejected, so issue separate calls instead.

## Guidelines
1. Say what you are about to do and why before calling a tool.
2. Destructive operations are refused; mutating operations need the user's approval.
3. After a command finishes, summarise its output clearly.
4. If a command fails, explain the error and suggest a fix.
5. Never send local data to external services unless the user explicitly asks.

## Format
- Use Markdown. Keep explanations short but complete.
";

const FAST_PROMPT: &str = "\
You are Roost (fast mode). Answer briefly and directly. \
No tool usage in this mode. Reply in the language the user writes in.
";

/// Ephemeral user instruction for the follow-up call after commands ran. Never stored.
pub const SUMMARY_INSTRUCTION: &str = "\
The commands above have finished. Using their results, answer my original request in plain \
natural language. Do not output JSON, tool calls, or code blocks. Do not propose further \
commands.";

/// Agent operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum Mode {
    /// Tools enabled; replies are withheld until execution completes.
    #[default]
    Planning,
    /// No tools; replies stream live.
    Fast,
}

impl Mode {
    /// Parse a mode name. Unknown names fall back to [`Mode::Planning`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        Self::try_parse(name).unwrap_or_default()
    }

    /// Strict parse, `None` for unknown names.
    #[must_use]
    pub fn try_parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "planning" | "plan" => Some(Self::Planning),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Fast => "fast",
        }
    }

    #[must_use]
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Planning => PLANNING_PROMPT,
            Self::Fast => FAST_PROMPT,
        }
    }

    /// Tools offered to the model in this mode. Empty means live streaming.
    #[must_use]
    pub fn tools(self) -> Vec<ToolDefinition> {
        match self {
            Self::Planning => vec![execute_command_tool()],
            Self::Fast => Vec::new(),
        }
    }
}

impl From<String> for Mode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema of the single `execute_command` function.
#[must_use]
pub fn execute_command_tool() -> ToolDefinition {
    ToolDefinition {
        name: EXECUTE_COMMAND.to_owned(),
        description: "Execute a shell command on the user's local machine and return its \
                      stdout/stderr. Use this to inspect the filesystem, run programs, or \
                      install packages."
            .to_owned(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute (e.g. 'ls -la', 'pip install requests')."
                },
                "reason": {
                    "type": "string",
                    "description": "A short explanation of why this command is being run, shown to the user before execution."
                }
            },
            "required": ["command", "reason"]
        }),
    }
}
