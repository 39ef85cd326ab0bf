use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::AuditConfig;
use crate::policy::Tier;

/// Append-only record of security-relevant events.
#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Disabled,
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
    Memory(Mutex<Vec<AuditEntry>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CommandBlocked,
    CommandDenied,
    CommandExec,
    Message,
    BotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub timestamp: u64,
    pub user_id: String,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub result: String,
}

impl AuditEntry {
    #[must_use]
    pub fn new(user_id: impl Into<String>, action: AuditAction, result: impl Into<String>) -> Self {
        Self {
            timestamp: unix_now(),
            user_id: user_id.into(),
            action,
            command: None,
            tier: None,
            result: result.into(),
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>, tier: Tier) -> Self {
        self.command = Some(command.into());
        self.tier = Some(tier);
        self
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl AuditLogger {
    /// Create a new `AuditLogger` from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, std::io::Error> {
        let destination = if !config.enabled {
            AuditDestination::Disabled
        } else if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let path = Path::new(&config.destination);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            destination: AuditDestination::Disabled,
        }
    }

    /// Logger that keeps entries in memory, for inspection via [`AuditLogger::entries`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            destination: AuditDestination::Memory(Mutex::new(Vec::new())),
        }
    }

    /// Entries recorded so far. Empty unless the logger was built with [`AuditLogger::in_memory`].
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        match &self.destination {
            AuditDestination::Memory(entries) => entries
                .lock()
                .map(|e| e.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub async fn log(&self, entry: &AuditEntry) {
        match &self.destination {
            AuditDestination::Disabled => {}
            AuditDestination::Memory(entries) => {
                if let Ok(mut entries) = entries.lock() {
                    entries.push(entry.clone());
                }
            }
            AuditDestination::Stdout => {
                let Ok(json) = serde_json::to_string(entry) else {
                    return;
                };
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                use tokio::io::AsyncWriteExt;
                let Ok(json) = serde_json::to_string(entry) else {
                    return;
                };
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write audit log: {e}");
                }
            }
        }
    }
}
