//! File write tool — create or overwrite a file, creating parent directories.

use async_trait::async_trait;
use codecrafter_core::error::ToolError;
use codecrafter_core::tool::{Tool, ToolInvocation};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::path::resolve_within;

pub struct WriteToFileTool {
    workspace_root: PathBuf,
}

impl WriteToFileTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for WriteToFileTool {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file. This is the primary method for creating or \
         overwriting files. It creates parent directories automatically."
    }

    fn usage(&self) -> &str {
        "<write_to_file><path>path/to/file.txt</path><content>File content</content></write_to_file>"
    }

    fn required_parameters(&self) -> &[&str] {
        &["path", "content"]
    }

    async fn run(&self, parameters: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let path = ToolInvocation::require(parameters, "write_to_file", "path")?;
        let content = ToolInvocation::require(parameters, "write_to_file", "content")?;
        let resolved = resolve_within(&self.workspace_root, path, "write_to_file")?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "write_to_file".into(),
                    reason: format!("Failed to create parent directories for '{path}': {e}"),
                })?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "write_to_file".into(),
                reason: format!("Failed to write '{path}': {e}"),
            })?;

        Ok(format!("Wrote {} bytes to {path}", content.len()))
    }
}
