mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the resulting
    /// configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first inconsistent setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.confirm.hard_timeout_secs < self.confirm.display_timeout_secs {
            bail!(
                "confirm.hard_timeout_secs ({}) must not be shorter than confirm.display_timeout_secs ({})",
                self.confirm.hard_timeout_secs,
                self.confirm.display_timeout_secs
            );
        }
        if self.agent.message_limit == 0 {
            bail!("agent.message_limit must be greater than zero");
        }
        if self.agent.stream_edit_tokens == 0 {
            bail!("agent.stream_edit_tokens must be greater than zero");
        }
        roost_tools::CommandPolicy::from_config(&self.tools.shell)
            .context("invalid tools.shell.extra_patterns entry")?;
        Ok(())
    }
}
