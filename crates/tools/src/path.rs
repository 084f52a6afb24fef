//! Path confinement — filesystem access is scoped to the workspace root.
//!
//! The root is computed once at startup and read-only thereafter. Every
//! file tool resolves its path argument through here before touching disk.

use codecrafter_core::error::ToolError;
use std::path::{Path, PathBuf};

/// Resolve a tool-supplied path inside the workspace root.
///
/// Relative paths are joined onto the root; absolute paths must already lie
/// within it. Traversal sequences and symlink escapes (via canonicalization
/// of the nearest existing ancestor) are rejected.
pub fn resolve_within(root: &Path, raw: &str, tool_name: &str) -> Result<PathBuf, ToolError> {
    let denied = |reason: String| ToolError::PermissionDenied {
        tool_name: tool_name.into(),
        reason,
    };

    let normalized = raw.replace('\\', "/");
    if normalized.contains("../") || normalized.contains("/..") || normalized == ".." {
        return Err(denied(format!("path traversal detected in '{raw}'")));
    }

    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let root_canonical = root
        .canonicalize()
        .map_err(|e| denied(format!("workspace root unavailable: {e}")))?;

    // Canonicalize the path itself, or its nearest existing ancestor for
    // paths that do not exist yet (writes).
    let canonical = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| denied(format!("cannot resolve '{raw}': {e}")))?
    } else if let Some(parent) = joined.parent() {
        if parent.exists() {
            let canonical_parent = parent
                .canonicalize()
                .map_err(|e| denied(format!("cannot resolve parent of '{raw}': {e}")))?;
            canonical_parent.join(joined.file_name().unwrap_or_default())
        } else {
            joined.clone()
        }
    } else {
        joined.clone()
    };

    if !canonical.starts_with(&root_canonical) {
        return Err(denied(format!("'{raw}' is outside the workspace root")));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_resolves_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let resolved = resolve_within(dir.path(), "a.txt", "read_file").unwrap();
        assert!(resolved.ends_with("a.txt"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_within(dir.path(), "../../etc/passwd", "read_file").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_within(dir.path(), "/etc/passwd", "read_file").unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[test]
    fn nonexistent_path_resolves_for_writes() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_within(dir.path(), "new/file.txt", "write_to_file");
        // Parent does not exist yet; resolution still stays under the root.
        assert!(resolved.unwrap().starts_with(dir.path()));
    }

    #[test]
    fn absolute_path_inside_root_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inside.txt"), "x").unwrap();
        let absolute = dir.path().canonicalize().unwrap().join("inside.txt");

        let resolved = resolve_within(dir.path(), absolute.to_str().unwrap(), "read_file");
        assert!(resolved.is_ok());
    }
}
