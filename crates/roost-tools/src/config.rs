use serde::Deserialize;

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_output_chars() -> usize {
    4000
}

fn default_audit_destination() -> String {
    "stdout".into()
}

/// Top-level configuration for command execution.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Shell execution limits and extensions to the built-in tier tables.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default)]
    pub extra_safe: Vec<String>,
    #[serde(default)]
    pub extra_confirm: Vec<String>,
    #[serde(default)]
    pub extra_blocked: Vec<String>,
    /// Additional regexes that block a command outright.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

/// Where audit records go: `"stdout"` or a file path.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shell: ShellConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_output_chars: default_max_output_chars(),
            extra_safe: Vec::new(),
            extra_confirm: Vec::new(),
            extra_blocked: Vec::new(),
            extra_patterns: Vec::new(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: default_audit_destination(),
        }
    }
}
