//! Remote command execution and CLI response parsing.
//!
//! The engine never talks to the org directly. It hands a command line to a
//! [`CommandGateway`] together with a timeout and gets raw text back. The text is
//! parsed with [`parse_cli_json`], which tolerates warning lines printed before the
//! JSON payload.
//!
//! # Public API
//! - [`CommandGateway`]: Async trait for executing a command with a timeout
//! - [`ShellGateway`]: Production implementation backed by `tokio::process`
//! - [`CliEnvelope`]: Top-level `{status, result, message}` shape of `--json` output
//! - [`parse_cli_json`] / [`parse_cli_result`]: Envelope parsing and status checking
//! - [`classify_cli_message`]: Map CLI error text onto the error taxonomy

use crate::core::error::{Result, SyncError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[async_trait]
pub trait CommandGateway: Send + Sync {
    /// Execute `command` and return its stdout, failing with a typed error.
    async fn execute(&self, command: &str, timeout: Duration) -> Result<String>;
}

/// Runs commands through the platform shell from the project root
#[derive(Debug, Clone)]
pub struct ShellGateway {
    working_dir: PathBuf,
}

impl ShellGateway {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    fn shell_command(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

#[async_trait]
impl CommandGateway for ShellGateway {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<String> {
        log::debug!("Executing (timeout {}s): {command}", timeout.as_secs());

        let mut cmd = Self::shell_command(command);
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::cli_missing(e.to_string())
            } else {
                SyncError::Io(e)
            }
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                log::warn!("Command timed out after {}s: {command}", timeout.as_secs());
                return Err(SyncError::timeout(command, timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        interpret_output(output.status.code(), stdout, stderr)
    }
}

/// Decide whether a finished process produced a usable payload.
///
/// `--json` commands report structured failures on stdout with a non-zero exit,
/// so a JSON-looking stdout is returned for the caller to inspect.
pub fn interpret_output(code: Option<i32>, stdout: String, stderr: String) -> Result<String> {
    let has_payload = stdout.contains('{') || stdout.contains('[');

    if code == Some(0) {
        if stdout.trim().is_empty() && !is_benign_stderr(&stderr) {
            return Err(SyncError::process_failure(stderr.trim()));
        }
        return Ok(stdout);
    }

    if has_payload {
        return Ok(stdout);
    }

    let stderr = stderr.trim();
    // 127: the shell could not find the command
    if code == Some(127) || looks_like_missing_cli(stderr) {
        return Err(SyncError::cli_missing(stderr));
    }
    if stderr.is_empty() {
        return Err(SyncError::process_failure(format!(
            "exited with status {}",
            code.map_or_else(|| "signal".to_string(), |c| c.to_string())
        )));
    }
    Err(SyncError::process_failure(stderr))
}

/// Warning-only stderr (update notices, deprecation warnings) is not a failure.
pub fn is_benign_stderr(stderr: &str) -> bool {
    stderr.lines().map(str::trim).filter(|l| !l.is_empty()).all(|line| {
        let line = line.trim_start_matches(['›', ' ']);
        let lower = line.to_lowercase();
        lower.starts_with("warning")
            || lower.starts_with("(node:")
            || lower.contains("update available")
    })
}

fn looks_like_missing_cli(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("command not found")
        || lower.contains("is not recognized as an internal or external command")
        || lower.contains("no such file or directory")
}

/// Top-level shape of `sf ... --json` output
#[derive(Debug, Clone, Deserialize)]
pub struct CliEnvelope<T> {
    #[serde(default)]
    pub status: i64,
    pub result: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Parse CLI output, skipping anything before the first `{` or `[`.
pub fn parse_cli_json<T: DeserializeOwned>(raw: &str) -> Result<CliEnvelope<T>> {
    let start = raw
        .find(['{', '['])
        .ok_or_else(|| SyncError::parse_failure("no JSON payload in CLI output"))?;
    serde_json::from_str(&raw[start..]).map_err(|e| {
        log::debug!("Unparseable CLI output: {}", &raw[start..]);
        SyncError::parse_failure(e.to_string())
    })
}

/// Parse CLI output and turn a non-zero `status` into a classified error.
pub fn parse_cli_result<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let envelope: CliEnvelope<T> = parse_cli_json(raw)?;
    if envelope.status != 0 {
        let message = envelope
            .message
            .unwrap_or_else(|| format!("CLI reported status {}", envelope.status));
        return Err(classify_cli_message(envelope.name.as_deref(), &message));
    }
    envelope
        .result
        .ok_or_else(|| SyncError::parse_failure("CLI response has no result"))
}

/// Map a CLI error name/message onto the error taxonomy.
pub fn classify_cli_message(name: Option<&str>, message: &str) -> SyncError {
    let haystack = format!("{} {}", name.unwrap_or_default(), message).to_lowercase();

    if looks_like_missing_cli(&haystack) {
        SyncError::cli_missing(message)
    } else if haystack.contains("nodefaultenverror")
        || haystack.contains("no default")
        || haystack.contains("no target org")
        || haystack.contains("noorgfound")
        || haystack.contains("no authorization information")
    {
        SyncError::not_connected(message)
    } else if haystack.contains("expired")
        || haystack.contains("invalid_session_id")
        || haystack.contains("refreshtoken")
        || haystack.contains("invalid_grant")
    {
        SyncError::auth_expired(message)
    } else {
        SyncError::process_failure(message)
    }
}
