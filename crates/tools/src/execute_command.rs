//! Shell command tool — execute system commands in the workspace.
//!
//! Supports command allowlisting and a fixed per-invocation timeout, so a
//! hanging command returns to the loop instead of blocking it forever.

use async_trait::async_trait;
use codecrafter_core::error::ToolError;
use codecrafter_core::tool::{Tool, ToolInvocation};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ExecuteCommandTool {
    workspace_root: PathBuf,
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
    timeout_secs: u64,
}

impl ExecuteCommandTool {
    pub fn new(workspace_root: PathBuf, allowed_commands: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            workspace_root,
            allowed_commands,
            timeout_secs,
        }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Executes a shell command in the workspace. The `cd` command is not persistent. \
         Use for system operations, installing dependencies, or running scripts."
    }

    fn usage(&self) -> &str {
        "<execute_command><command>mkdir -p path/to/directory</command></execute_command>"
    }

    fn required_parameters(&self) -> &[&str] {
        &["command"]
    }

    async fn run(&self, parameters: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let command = ToolInvocation::require(parameters, "execute_command", "command")?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "execute_command".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, "Executing shell command");

        let child = if cfg!(target_os = "windows") {
            Command::new("cmd")
                .args(["/C", command])
                .current_dir(&self.workspace_root)
                .output()
        } else {
            Command::new("sh")
                .args(["-c", command])
                .current_dir(&self.workspace_root)
                .output()
        };

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: "execute_command".into(),
                timeout_secs: self.timeout_secs,
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "execute_command".into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let result_text = if output.status.success() {
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let result_text = result_text.trim().to_string();
        if result_text.is_empty() {
            Ok("(no output)".into())
        } else {
            Ok(result_text)
        }
    }
}
