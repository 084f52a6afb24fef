//! File read tool — read file contents with workspace confinement.

use async_trait::async_trait;
use codecrafter_core::error::ToolError;
use codecrafter_core::tool::{Tool, ToolInvocation};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::path::resolve_within;

pub struct ReadFileTool {
    workspace_root: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the content of a file."
    }

    fn usage(&self) -> &str {
        "<read_file><path>path/to/file.txt</path></read_file>"
    }

    fn required_parameters(&self) -> &[&str] {
        &["path"]
    }

    async fn run(&self, parameters: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let path = ToolInvocation::require(parameters, "read_file", "path")?;
        let resolved = resolve_within(&self.workspace_root, path, "read_file")?;

        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("Failed to read '{path}': {e}"),
            })
    }
}
