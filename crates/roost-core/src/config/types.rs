use std::time::Duration;

use serde::Deserialize;
use roost_tools::ToolsConfig;

use crate::prompt::Mode;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub confirm: ConfirmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "qwen2.5-coder:14b".into()
}

fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_edit_interval_ms() -> u64 {
    500
}

fn default_edit_tokens() -> usize {
    50
}

fn default_message_limit() -> usize {
    2000
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub mode: Mode,
    /// Minimum time between visible edits while streaming.
    #[serde(default = "default_edit_interval_ms")]
    pub stream_edit_interval_ms: u64,
    /// Tokens buffered since the last edit that force an early edit.
    #[serde(default = "default_edit_tokens")]
    pub stream_edit_tokens: usize,
    /// Transport message-size limit in characters.
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// Messages kept per user, not counting the system prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            stream_edit_interval_ms: default_edit_interval_ms(),
            stream_edit_tokens: default_edit_tokens(),
            message_limit: default_message_limit(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_display_timeout() -> u64 {
    30
}

fn default_hard_timeout() -> u64 {
    35
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmConfig {
    /// How long the approval surface keeps its controls live.
    #[serde(default = "default_display_timeout")]
    pub display_timeout_secs: u64,
    /// Absolute limit enforced by the gate itself.
    #[serde(default = "default_hard_timeout")]
    pub hard_timeout_secs: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            display_timeout_secs: default_display_timeout(),
            hard_timeout_secs: default_hard_timeout(),
        }
    }
}
