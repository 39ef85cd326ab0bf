use std::io::Write;

use serial_test::serial;

use super::*;
use crate::prompt::Mode;

const ENV_KEYS: [&str; 8] = [
    "ROOST_LLM_BASE_URL",
    "ROOST_LLM_MODEL",
    "ROOST_LLM_TIMEOUT",
    "ROOST_MODE",
    "ROOST_TOOLS_TIMEOUT",
    "ROOST_TOOLS_AUDIT_ENABLED",
    "ROOST_TOOLS_AUDIT_DESTINATION",
    "ROOST_CONFIRM_HARD_TIMEOUT",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("roost.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.llm.base_url, "http://localhost:11434");
    assert_eq!(config.llm.timeout_secs, 120);
    assert_eq!(config.agent.mode, Mode::Planning);
    assert_eq!(config.agent.stream_edit_interval_ms, 500);
    assert_eq!(config.agent.stream_edit_tokens, 50);
    assert_eq!(config.agent.message_limit, 2000);
    assert_eq!(config.confirm.display_timeout_secs, 30);
    assert_eq!(config.confirm.hard_timeout_secs, 35);
    assert!(config.tools.audit.enabled);
    assert_eq!(config.tools.shell.timeout, 30);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.llm.model, "qwen2.5-coder:14b");
}

#[test]
#[serial]
fn parse_valid_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[llm]
base_url = "http://gpu-box:11434"
model = "llama3.1:8b"

[agent]
mode = "fast"
message_limit = 4000

[confirm]
display_timeout_secs = 20
hard_timeout_secs = 25

[tools.shell]
timeout = 10
extra_blocked = ["curl"]

[tools.audit]
destination = "audit.jsonl"
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.base_url, "http://gpu-box:11434");
    assert_eq!(config.llm.model, "llama3.1:8b");
    assert_eq!(config.agent.mode, Mode::Fast);
    assert_eq!(config.agent.message_limit, 4000);
    assert_eq!(config.confirm.hard_timeout_secs, 25);
    assert_eq!(config.tools.shell.timeout, 10);
    assert_eq!(config.tools.shell.extra_blocked, vec!["curl"]);
    assert_eq!(config.tools.audit.destination, "audit.jsonl");
}

#[test]
#[serial]
fn unknown_mode_falls_back_to_planning() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[agent]\nmode = \"turbo\"\n");
    let config = Config::load(&path).unwrap();
    assert_eq!(config.agent.mode, Mode::Planning);
}

#[test]
#[serial]
fn invalid_toml_errors() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[llm\nmodel = ");
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    unsafe {
        std::env::set_var("ROOST_LLM_MODEL", "phi4");
        std::env::set_var("ROOST_LLM_TIMEOUT", "5");
        std::env::set_var("ROOST_MODE", "fast");
        std::env::set_var("ROOST_TOOLS_TIMEOUT", "90");
        std::env::set_var("ROOST_TOOLS_AUDIT_ENABLED", "false");
        std::env::set_var("ROOST_TOOLS_AUDIT_DESTINATION", "/tmp/roost-audit.jsonl");
        std::env::set_var("ROOST_CONFIRM_HARD_TIMEOUT", "60");
    }
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    clear_env();

    assert_eq!(config.llm.model, "phi4");
    assert_eq!(config.llm.timeout_secs, 5);
    assert_eq!(config.agent.mode, Mode::Fast);
    assert_eq!(config.tools.shell.timeout, 90);
    assert!(!config.tools.audit.enabled);
    assert_eq!(config.tools.audit.destination, "/tmp/roost-audit.jsonl");
    assert_eq!(config.confirm.hard_timeout_secs, 60);
}

#[test]
#[serial]
fn invalid_numeric_env_ignored() {
    clear_env();
    unsafe { std::env::set_var("ROOST_TOOLS_TIMEOUT", "soon") };
    let config = Config::load(std::path::Path::new("/nonexistent/roost.toml")).unwrap();
    clear_env();
    assert_eq!(config.tools.shell.timeout, 30);
}

#[test]
#[serial]
fn hard_timeout_shorter_than_display_rejected() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "[confirm]\ndisplay_timeout_secs = 30\nhard_timeout_secs = 10\n",
    );
    let err = Config::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("hard_timeout_secs"));
}

#[test]
fn zero_message_limit_rejected() {
    let mut config = Config::default();
    config.agent.message_limit = 0;
    assert!(config.validate().is_err());
}

#[test]
fn invalid_extra_pattern_rejected() {
    let mut config = Config::default();
    config.tools.shell.extra_patterns = vec!["[".into()];
    assert!(config.validate().is_err());
}
