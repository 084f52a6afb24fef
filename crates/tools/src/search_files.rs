//! Regex search tool — find text patterns across files in a directory tree.

use async_trait::async_trait;
use codecrafter_core::error::ToolError;
use codecrafter_core::tool::{Tool, ToolInvocation};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use walkdir::WalkDir;

const MAX_MATCHES: usize = 100;
const MAX_LINE_LEN: usize = 200;

pub struct SearchFilesTool {
    workspace_root: PathBuf,
}

impl SearchFilesTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }

    /// Match a `*.ext`-style glob suffix, or substring for anything else.
    fn file_matches(pattern: &str, name: &str) -> bool {
        if let Some(suffix) = pattern.strip_prefix('*') {
            name.ends_with(suffix)
        } else {
            name.contains(pattern)
        }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Searches for text patterns using regex across multiple files. Perfect \
         for finding specific code patterns or content."
    }

    fn usage(&self) -> &str {
        "<search_files><directory>src/</directory><regex_pattern>class \\w+</regex_pattern><file_pattern>*.py</file_pattern></search_files>"
    }

    fn required_parameters(&self) -> &[&str] {
        &["directory", "regex_pattern"]
    }

    async fn run(&self, parameters: &BTreeMap<String, String>) -> Result<String, ToolError> {
        let directory = ToolInvocation::require(parameters, "search_files", "directory")?;
        let pattern = ToolInvocation::require(parameters, "search_files", "regex_pattern")?;
        let file_pattern = parameters.get("file_pattern").map(|s| s.as_str());

        let regex = Regex::new(pattern).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "search_files".into(),
            reason: format!("Invalid regex '{pattern}': {e}"),
        })?;

        let resolved = crate::path::resolve_within(&self.workspace_root, directory, "search_files")?;

        let mut matches = Vec::new();
        let mut truncated = false;

        'files: for entry in WalkDir::new(&resolved)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy();
            if let Some(fp) = file_pattern {
                if !Self::file_matches(fp, &name) {
                    continue;
                }
            }

            // Binary and unreadable files are skipped, not errors.
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };

            let display_path = entry
                .path()
                .strip_prefix(&resolved)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();

            for (line_no, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    let shown: String = line.trim().chars().take(MAX_LINE_LEN).collect();
                    matches.push(format!("{display_path}:{}: {shown}", line_no + 1));
                    if matches.len() >= MAX_MATCHES {
                        truncated = true;
                        break 'files;
                    }
                }
            }
        }

        if matches.is_empty() {
            return Ok(format!("No matches for '{pattern}' in '{directory}'"));
        }

        let mut result = matches.join("\n");
        if truncated {
            result.push_str(&format!("\n(truncated at {MAX_MATCHES} matches)"));
        }
        Ok(result)
    }
}
