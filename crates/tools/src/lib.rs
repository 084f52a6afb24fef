//! Built-in tool implementations for codecrafter.
//!
//! Tools give the agent the ability to interact with the world: run shell
//! commands, read/write files, make selective edits, and search a source
//! tree. All filesystem access is confined to the workspace root, computed
//! once at startup.

pub mod execute_command;
pub mod list_files;
pub mod path;
pub mod read_file;
pub mod replace_in_file;
pub mod search_files;
pub mod write_to_file;

use codecrafter_core::tool::ToolRegistry;
use std::path::PathBuf;

pub use path::resolve_within;

/// Create the default tool registry, confined to `workspace_root`.
///
/// `allowed_commands` empty = all shell commands allowed;
/// `command_timeout_secs` bounds each `execute_command` invocation.
pub fn default_registry(
    workspace_root: PathBuf,
    allowed_commands: Vec<String>,
    command_timeout_secs: u64,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(execute_command::ExecuteCommandTool::new(
        workspace_root.clone(),
        allowed_commands,
        command_timeout_secs,
    )));
    registry.register(Box::new(read_file::ReadFileTool::new(workspace_root.clone())));
    registry.register(Box::new(write_to_file::WriteToFileTool::new(
        workspace_root.clone(),
    )));
    registry.register(Box::new(list_files::ListFilesTool::new(workspace_root.clone())));
    registry.register(Box::new(replace_in_file::ReplaceInFileTool::new(
        workspace_root.clone(),
    )));
    registry.register(Box::new(search_files::SearchFilesTool::new(workspace_root)));
    registry
}
