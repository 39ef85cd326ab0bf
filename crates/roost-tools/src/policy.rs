//! Command tier classification and shell-injection detection.
//!
//! Every command proposed by the model is mapped to one of three tiers:
//! [`Tier::Safe`] runs immediately, [`Tier::Confirm`] waits for the requesting user,
//! [`Tier::Blocked`] never runs. Unknown executables land in `Confirm`, never `Safe`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ShellConfig;

const SAFE_COMMANDS: &[&str] = &[
    "ls",
    "dir",
    "cat",
    "type",
    "echo",
    "nvidia-smi",
    "systeminfo",
];

const CONFIRM_COMMANDS: &[&str] = &["pip", "npm", "mkdir", "cp", "move", "python"];

const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "del", "format", "reg", "shutdown", "taskkill", "eval", "exec",
];

const GIT_SAFE: &[&str] = &["status", "log", "diff"];
const OLLAMA_SAFE: &[&str] = &["list"];

const EXECUTABLE_EXTENSIONS: &[&str] = &[".exe", ".bat", ".cmd", ".com"];

const DANGEROUS_PATTERNS: &[&str] = &[
    r"(?i)\bpowershell(?:\.exe)?\b.*\s-enc(?:odedcommand)?\b",
    r"(?i)\bcmd(?:\.exe)?\s+/c\b",
    r"(?i)\bcurl\b.*\|\s*(?:ba)?sh\b",
    r"(?i)\bwget\b.*\|\s*(?:ba)?sh\b",
];

static INJECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[;|`]|&&|\|\||\$\(").expect("injection regex is valid")
});

static BUILTIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DANGEROUS_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("builtin dangerous pattern is valid"))
        .collect()
});

/// Security tier of a command. Ordered by caution: `Safe < Confirm < Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Safe,
    Confirm,
    Blocked,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Confirm => "confirm",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command ended up in [`Tier::Blocked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Empty,
    Injection,
    DangerousPattern(String),
    MalformedQuoting,
    Destructive(String),
    Policy,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty command"),
            Self::Injection => f.write_str(
                "shell injection pattern detected: chaining operators (; && || | ` $() are not allowed",
            ),
            Self::DangerousPattern(p) => write!(f, "matches dangerous pattern: {p}"),
            Self::MalformedQuoting => f.write_str("malformed command (invalid quoting)"),
            Self::Destructive(cmd) => write!(
                f,
                "command '{cmd}' is in the blocked tier: destructive operations are not allowed"
            ),
            Self::Policy => f.write_str("command is blocked by security policy"),
        }
    }
}

/// Outcome of [`CommandPolicy::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub tier: Tier,
    /// Present only for `Blocked`.
    pub reason: Option<BlockReason>,
    /// Path- and extension-stripped, lowercased first token, when tokenization succeeded.
    pub base_executable: Option<String>,
}

impl Verdict {
    fn blocked(reason: BlockReason, base_executable: Option<String>) -> Self {
        Self {
            tier: Tier::Blocked,
            reason: Some(reason),
            base_executable,
        }
    }

    #[must_use]
    pub fn reason_text(&self) -> Option<String> {
        self.reason.as_ref().map(ToString::to_string)
    }
}

/// Sub-command routing for multi-purpose tools. Only listed sub-commands are safe, so
/// `git commit` or `ollama rm` need confirmation.
#[derive(Debug, Clone, Default)]
struct SubcommandRule {
    safe: HashSet<String>,
}

impl SubcommandRule {
    fn new(safe: &[&str]) -> Self {
        Self {
            safe: safe.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn tier(&self, sub: &str) -> Tier {
        if self.safe.contains(sub) {
            Tier::Safe
        } else {
            Tier::Confirm
        }
    }
}

/// Immutable classification tables. Build once and share.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    safe: HashSet<String>,
    confirm: HashSet<String>,
    blocked: HashSet<String>,
    subcommands: HashMap<String, SubcommandRule>,
    patterns: Vec<Regex>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        let to_set = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
        let mut subcommands = HashMap::new();
        subcommands.insert("git".to_owned(), SubcommandRule::new(GIT_SAFE));
        subcommands.insert("ollama".to_owned(), SubcommandRule::new(OLLAMA_SAFE));
        Self {
            safe: to_set(SAFE_COMMANDS),
            confirm: to_set(CONFIRM_COMMANDS),
            blocked: to_set(BLOCKED_COMMANDS),
            subcommands,
            patterns: BUILTIN_PATTERNS.clone(),
        }
    }
}

impl CommandPolicy {
    /// Built-in tables extended with the `extra_*` lists from config.
    ///
    /// Entries named in `extra_blocked` are removed from the safe and confirm sets, so a block
    /// always wins over an allow.
    ///
    /// # Errors
    ///
    /// Returns an error if an extra dangerous pattern is not a valid regex.
    pub fn from_config(config: &ShellConfig) -> Result<Self, regex::Error> {
        let mut policy = Self::default();
        let norm = |s: &String| s.trim().to_lowercase();

        policy.safe.extend(config.extra_safe.iter().map(norm));
        policy.confirm.extend(config.extra_confirm.iter().map(norm));
        policy.blocked.extend(config.extra_blocked.iter().map(norm));

        let blocked = policy.blocked.clone();
        policy.safe.retain(|c| !blocked.contains(c));
        policy.confirm.retain(|c| !blocked.contains(c));
        // A command listed as both safe and confirm needs confirmation.
        let confirm = policy.confirm.clone();
        policy.safe.retain(|c| !confirm.contains(c));

        for pattern in &config.extra_patterns {
            policy.patterns.push(Regex::new(pattern)?);
        }
        Ok(policy)
    }

    /// True if `command` contains a chaining or substitution operator anywhere.
    #[must_use]
    pub fn check_injection(command: &str) -> bool {
        INJECTION_REGEX.is_match(command)
    }

    /// Tier for `command`, without the injection check.
    #[must_use]
    pub fn classify(&self, command: &str) -> Tier {
        self.classify_detailed(command).tier
    }

    /// Full validation: empty check, then injection, then classification.
    #[must_use]
    pub fn validate(&self, command: &str) -> Verdict {
        if command.trim().is_empty() {
            return Verdict::blocked(BlockReason::Empty, None);
        }
        if Self::check_injection(command) {
            tracing::warn!(command, "shell injection detected");
            return Verdict::blocked(BlockReason::Injection, None);
        }
        let verdict = self.classify_detailed(command);
        if let Some(ref reason) = verdict.reason {
            tracing::warn!(command, %reason, "blocked command");
        }
        verdict
    }

    fn classify_detailed(&self, command: &str) -> Verdict {
        let command = command.trim();
        if command.is_empty() {
            return Verdict::blocked(BlockReason::Empty, None);
        }

        if let Some(pattern) = self.patterns.iter().find(|p| p.is_match(command)) {
            return Verdict::blocked(BlockReason::DangerousPattern(pattern.as_str().to_owned()), None);
        }

        let Some(tokens) = shlex::split(command) else {
            return Verdict::blocked(BlockReason::MalformedQuoting, None);
        };
        let Some(first) = tokens.first() else {
            return Verdict::blocked(BlockReason::Policy, None);
        };

        // POSIX splitting eats backslashes. A drive or UNC path is read from the raw token,
        // anything else with a backslash is read both ways and the stricter tier wins.
        let raw_first = command.split_whitespace().next().unwrap_or_default();
        if is_windows_path(raw_first) {
            return self.classify_base(raw_first, &tokens);
        }
        let verdict = self.classify_base(first, &tokens);
        if raw_first.contains('\\') && !raw_first.contains(['"', '\'']) {
            let raw = self.classify_base(raw_first, &tokens);
            if raw.tier > verdict.tier {
                return raw;
            }
        }
        verdict
    }

    fn classify_base(&self, first: &str, tokens: &[String]) -> Verdict {
        let base = base_executable(first);
        if self.blocked.contains(&base) {
            return Verdict::blocked(BlockReason::Destructive(base.clone()), Some(base));
        }

        let tier = if let Some(rule) = self.subcommands.get(&base) {
            let sub = tokens.get(1).map(|s| s.to_lowercase()).unwrap_or_default();
            rule.tier(&sub)
        } else if self.safe.contains(&base) {
            Tier::Safe
        } else {
            Tier::Confirm
        };

        Verdict {
            tier,
            reason: None,
            base_executable: Some(base),
        }
    }
}

/// True for tokens starting with a drive letter (`C:\`) or a UNC prefix (`\\`).
#[must_use]
pub fn is_windows_path(token: &str) -> bool {
    let bytes = token.as_bytes();
    token.starts_with(r"\\")
        || (bytes.len() > 2
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && bytes[2] == b'\\')
}

/// Strip directory prefix (`/` or `\`) and a known executable extension, then lowercase.
#[must_use]
pub fn base_executable(token: &str) -> String {
    let lower = token.to_lowercase();
    let bare = lower.rsplit(['/', '\\']).next().unwrap_or(lower.as_str());
    EXECUTABLE_EXTENSIONS
        .iter()
        .find_map(|ext| bare.strip_suffix(ext))
        .unwrap_or(bare)
        .to_owned()
}
