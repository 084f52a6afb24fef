//! Directory listing tool.

use async_trait::async_trait;
use codecrafter_core::error::ToolError;
use codecrafter_core::tool::{Tool, ToolInvocation};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::path::resolve_within;

pub struct ListFilesTool {
    workspace_root: PathBuf,
}

impl ListFilesTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "Lists files in a directory."
    }

    fn usage(&self) -> &str {
        "<list_files><path>directory_path</path></list_files>"
    }

    fn required_parameters(&self) -> &[&str] {
        &["path"]
    }

    async fn run(&self, parameters: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let path = ToolInvocation::require(parameters, "list_files", "path")?;
        let resolved = resolve_within(&self.workspace_root, path, "list_files")?;

        let mut read_dir =
            tokio::fs::read_dir(&resolved)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "list_files".into(),
                    reason: format!("Failed to list '{path}': {e}"),
                })?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| {
            ToolError::ExecutionFailed {
                tool_name: "list_files".into(),
                reason: format!("Failed to read entry in '{path}': {e}"),
            }
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }

        entries.sort();
        if entries.is_empty() {
            Ok(format!("Directory '{path}' is empty"))
        } else {
            Ok(entries.join("\n"))
        }
    }
}
