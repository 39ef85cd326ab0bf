use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::ShellConfig;
use crate::executor::{CommandExecutor, ExecutionResult, ToolError, truncate_output};
use crate::policy::{CommandPolicy, Tier, is_windows_path};

/// Runs commands as a tokenized argv, re-validating every request against the policy.
///
/// No shell sits between the policy and the process, so operators the policy does not model
/// (`&`, newlines, redirects) reach the program as literal arguments.
#[derive(Debug)]
pub struct ShellExecutor {
    policy: CommandPolicy,
    timeout: Duration,
    max_output_chars: usize,
}

impl ShellExecutor {
    #[must_use]
    pub fn new(config: &ShellConfig, policy: CommandPolicy) -> Self {
        Self {
            policy,
            timeout: Duration::from_secs(config.timeout),
            max_output_chars: config.max_output_chars,
        }
    }

    async fn run(&self, command: &str, tier: Tier) -> Result<ExecutionResult, ToolError> {
        tracing::info!(command, %tier, "executing command");
        let cmd = match build_command(command) {
            Ok(cmd) => cmd,
            Err(err) => return Ok(ExecutionResult::error(tier, err.to_string())),
        };
        let outcome = run_process(cmd, self.timeout).await?;
        let output = truncate_output(&outcome.output, self.max_output_chars);
        if outcome.timed_out {
            let err = ToolError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            };
            return Ok(ExecutionResult::error(tier, err.to_string()).with_output(output));
        }
        match outcome.exit_code {
            Some(0) => Ok(ExecutionResult::executed(tier, output, Some(0))),
            code => {
                let mut result = ExecutionResult::error(
                    tier,
                    code.map_or_else(
                        || "terminated by signal".to_owned(),
                        |c| format!("exited with status {c}"),
                    ),
                )
                .with_output(output);
                result.exit_code = code;
                Ok(result)
            }
        }
    }
}

impl CommandExecutor for ShellExecutor {
    async fn execute(
        &self,
        command: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<ExecutionResult, ToolError> {
        let verdict = self.policy.validate(command);
        match verdict.tier {
            Tier::Blocked => Ok(ExecutionResult::blocked(
                verdict.reason_text().unwrap_or_default(),
            )),
            Tier::Confirm => {
                tracing::debug!(command, user_id, "command needs confirmation");
                Ok(ExecutionResult::pending_confirm(Tier::Confirm))
            }
            Tier::Safe => {
                tracing::debug!(command, user_id, reason, "safe command");
                self.run(command, Tier::Safe).await
            }
        }
    }

    async fn confirm_execute(
        &self,
        command: &str,
        user_id: &str,
    ) -> Result<ExecutionResult, ToolError> {
        let verdict = self.policy.validate(command);
        if verdict.tier == Tier::Blocked {
            tracing::warn!(command, user_id, "refusing confirmed execution of blocked command");
            return Ok(ExecutionResult::blocked(
                verdict.reason_text().unwrap_or_default(),
            ));
        }
        self.run(command, verdict.tier).await
    }
}

#[derive(Debug)]
struct ProcessOutcome {
    output: String,
    exit_code: Option<i32>,
    timed_out: bool,
}

/// `cmd.exe` built-ins that have no executable on disk.
const CMD_BUILTINS: &[&str] = &["dir", "type", "echo", "copy", "move", "mkdir", "md"];

/// Characters `cmd.exe` treats as operators even inside an argument list.
const CMD_METACHARS: &[char] = &['&', '|', '<', '>', '^', '%', '\n', '\r'];

/// POSIX-split `command` into argv. Windows paths keep their backslashes.
fn split_argv(command: &str) -> Result<Vec<String>, ToolError> {
    let mut argv = shlex::split(command).ok_or_else(|| ToolError::InvalidParams {
        message: "unbalanced quotes in command".to_owned(),
    })?;
    if argv.is_empty() {
        return Err(ToolError::InvalidParams {
            message: "empty command".to_owned(),
        });
    }
    if cfg!(windows)
        && let Some(raw) = command.split_whitespace().next()
        && is_windows_path(raw)
    {
        argv[0] = raw.to_owned();
    }
    Ok(argv)
}

fn build_command(command: &str) -> Result<Command, ToolError> {
    let argv = split_argv(command)?;
    if cfg!(windows) && CMD_BUILTINS.contains(&argv[0].to_lowercase().as_str()) {
        if argv.iter().any(|a| a.contains(CMD_METACHARS)) {
            return Err(ToolError::InvalidParams {
                message: "cmd.exe operator in built-in arguments".to_owned(),
            });
        }
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").args(&argv);
        return Ok(cmd);
    }
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    Ok(cmd)
}

async fn run_process(mut cmd: Command, timeout: Duration) -> Result<ProcessOutcome, ToolError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<String>(64);

    if let Some(stdout) = child.stdout.take() {
        let tx = line_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = String::new();
            while reader.read_line(&mut buf).await.unwrap_or(0) > 0 {
                let _ = tx.send(std::mem::take(&mut buf)).await;
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = line_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = String::new();
            while reader.read_line(&mut buf).await.unwrap_or(0) > 0 {
                let _ = tx.send(format!("[stderr] {buf}")).await;
                buf.clear();
            }
        });
    }
    drop(line_tx);

    let mut combined = String::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        tokio::select! {
            line = line_rx.recv() => match line {
                Some(chunk) => combined.push_str(&chunk),
                None => break,
            },
            () = tokio::time::sleep_until(deadline) => {
                let _ = child.kill().await;
                return Ok(ProcessOutcome {
                    output: combined,
                    exit_code: None,
                    timed_out: true,
                });
            }
        }
    }

    let Ok(status) = tokio::time::timeout_at(deadline, child.wait()).await else {
        let _ = child.kill().await;
        return Ok(ProcessOutcome {
            output: combined,
            exit_code: None,
            timed_out: true,
        });
    };
    let status = status?;

    if combined.is_empty() {
        combined.push_str("(no output)");
    }
    Ok(ProcessOutcome {
        output: combined,
        exit_code: status.code(),
        timed_out: false,
    })
}
