//! Selective text replacement tool — precise edits without rewriting files.

use async_trait::async_trait;
use codecrafter_core::error::ToolError;
use codecrafter_core::tool::{Tool, ToolInvocation};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::path::resolve_within;

pub struct ReplaceInFileTool {
    workspace_root: PathBuf,
}

impl ReplaceInFileTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for ReplaceInFileTool {
    fn name(&self) -> &str {
        "replace_in_file"
    }

    fn description(&self) -> &str {
        "Performs selective text replacement in a file. Useful for precise \
         edits without rewriting entire files."
    }

    fn usage(&self) -> &str {
        "<replace_in_file><file_path>path/to/file.py</file_path><old_text>text to replace</old_text><new_text>new text</new_text></replace_in_file>"
    }

    fn required_parameters(&self) -> &[&str] {
        &["file_path", "old_text", "new_text"]
    }

    async fn run(&self, parameters: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let file_path = ToolInvocation::require(parameters, "replace_in_file", "file_path")?;
        let old_text = ToolInvocation::require(parameters, "replace_in_file", "old_text")?;
        let new_text = ToolInvocation::require(parameters, "replace_in_file", "new_text")?;

        if old_text.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "replace_in_file".into(),
                reason: "old_text must not be empty".into(),
            });
        }

        let resolved = resolve_within(&self.workspace_root, file_path, "replace_in_file")?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "replace_in_file".into(),
                reason: format!("Failed to read '{file_path}': {e}"),
            })?;

        let occurrences = content.matches(old_text).count();
        if occurrences == 0 {
            return Err(ToolError::ExecutionFailed {
                tool_name: "replace_in_file".into(),
                reason: format!("old_text not found in '{file_path}'"),
            });
        }

        let updated = content.replace(old_text, new_text);
        tokio::fs::write(&resolved, &updated)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "replace_in_file".into(),
                reason: format!("Failed to write '{file_path}': {e}"),
            })?;

        Ok(format!(
            "Replaced {occurrences} occurrence(s) in {file_path}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(file: &str, old: &str, new: &str) -> BTreeMap<String, String> {
        let mut p = BTreeMap::new();
        p.insert("file_path".into(), file.into());
        p.insert("old_text".into(), old.into());
        p.insert("new_text".into(), new.into());
        p
    }

    #[tokio::test]
    async fn replaces_all_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.py"), "foo bar foo").unwrap();

        let tool = ReplaceInFileTool::new(dir.path().to_path_buf());
        let result = tool.run(&params("f.py", "foo", "baz")).await.unwrap();
        assert!(result.contains("2 occurrence"));

        let content = std::fs::read_to_string(dir.path().join("f.py")).unwrap();
        assert_eq!(content, "baz bar baz");
    }

    #[tokio::test]
    async fn missing_old_text_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.py"), "nothing here").unwrap();

        let tool = ReplaceInFileTool::new(dir.path().to_path_buf());
        let err = tool.run(&params("f.py", "absent", "x")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn empty_old_text_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.py"), "content").unwrap();

        let tool = ReplaceInFileTool::new(dir.path().to_path_buf());
        let err = tool.run(&params("f.py", "", "x")).await.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }
}
