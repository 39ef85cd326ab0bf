use super::Config;
use crate::prompt::Mode;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ROOST_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("ROOST_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("ROOST_LLM_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.llm.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("ROOST_MODE") {
            self.agent.mode = Mode::parse(&v);
        }
        if let Ok(v) = std::env::var("ROOST_TOOLS_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.tools.shell.timeout = secs;
        }
        if let Ok(v) = std::env::var("ROOST_TOOLS_AUDIT_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.tools.audit.enabled = enabled;
        }
        if let Ok(v) = std::env::var("ROOST_TOOLS_AUDIT_DESTINATION") {
            self.tools.audit.destination = v;
        }
        if let Ok(v) = std::env::var("ROOST_CONFIRM_HARD_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.confirm.hard_timeout_secs = secs;
        }
    }
}
