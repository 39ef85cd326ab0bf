//! Command safety policy, tool-call extraction, and the shell backend.

pub mod audit;
pub mod config;
pub mod executor;
pub mod extractor;
pub mod policy;
pub mod shell;

pub use audit::{AuditAction, AuditEntry, AuditLogger};
pub use config::{AuditConfig, ShellConfig, ToolsConfig};
pub use executor::{
    CallOrigin, CommandArgs, CommandExecutor, EXECUTE_COMMAND, ExecStatus, ExecutionResult,
    ToolCall, ToolError, truncate_output,
};
pub use policy::{BlockReason, CommandPolicy, Tier, Verdict, base_executable, is_windows_path};
pub use shell::ShellExecutor;
