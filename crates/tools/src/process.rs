//! Running allowlisted programs.

use crate::desktop::validate_app_name;
use crate::params::{required_str, string_list};
use crate::traits::{ActionOutcome, Capability, CapabilityError, Parameters};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output kept per stream, in bytes.
const MAX_OUTPUT_BYTES: usize = 16 * 1024;

pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "date", "df", "echo", "free", "hostname", "ls", "pwd", "uname", "uptime", "whoami",
];

/// Runs a program without a shell, only if its name is on the allowlist.
pub struct RunCommandCapability {
    allowed: BTreeSet<String>,
}

impl RunCommandCapability {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, program: &str) -> bool {
        self.allowed.contains(program)
    }
}

impl Default for RunCommandCapability {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_COMMANDS.iter().copied())
    }
}

fn truncate(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_OUTPUT_BYTES {
        return text.into_owned();
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[async_trait]
impl Capability for RunCommandCapability {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run an allowlisted program and capture its output. params: {\"command\": string, \"args\"?: [string]}"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome, CapabilityError> {
        let program = required_str(&params, "command")?;
        validate_app_name(program)?;
        if !self.is_allowed(program) {
            warn!(program, "Rejected command outside allowlist");
            return Err(CapabilityError::InvalidParameters(format!(
                "command not allowed: {program}"
            )));
        }
        let args = string_list(&params, "args")?;
        if args.iter().any(|arg| arg.contains('\0')) {
            return Err(CapabilityError::InvalidParameters(
                "argument contains null byte".to_string(),
            ));
        }

        debug!(program, ?args, "Running command");
        let output = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;
        let stdout = truncate(&output.stdout);
        let stderr = truncate(&output.stderr);

        if output.status.success() {
            Ok(ActionOutcome::ok(json!({
                "exit_code": output.status.code(),
                "stdout": stdout,
                "stderr": stderr,
            })))
        } else {
            Ok(ActionOutcome::failed(format!(
                "{program} exited with {}: {}",
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr.trim()
            )))
        }
    }
}
