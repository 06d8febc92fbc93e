//! Filesystem utilities.
//!
//! Crash-tolerant writes and path containment checks for the upload roots.
//! Every generated file reaches its final name through a rename so readers
//! never observe a partially written asset.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Path Validation Utilities
// =============================================================================

/// Validates that an identifier component is safe to use in file paths.
///
/// Rejects empty strings, traversal sequences (`..`), path separators,
/// drive letter indicators (`:`) and control characters.
pub fn validate_path_id_component(id: &str, label: &str) -> CoreResult<()> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationError(format!(
            "{label} is empty or contains only whitespace"
        )));
    }
    if trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains(':')
    {
        return Err(CoreError::ValidationError(format!(
            "Invalid {label}: contains path traversal characters"
        )));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(CoreError::ValidationError(format!(
            "Invalid {label}: contains control characters"
        )));
    }
    Ok(())
}

/// Resolves `filename` under `root`, failing closed when the result escapes it.
///
/// The check runs on normalized absolute paths, so it rejects traversal
/// whether or not the target exists. Existence is left to the caller.
pub fn resolve_served_file(root: &Path, filename: &str) -> CoreResult<PathBuf> {
    if filename.is_empty() || filename.chars().any(|c| c.is_control()) {
        return Err(CoreError::PathOutsideRoot(format!(
            "invalid filename: {:?}",
            filename
        )));
    }

    let requested = Path::new(filename);
    if requested.is_absolute() || requested.has_root() {
        return Err(CoreError::PathOutsideRoot(filename.to_string()));
    }

    let root = canonicalize_or_normalize(root)?;
    let candidate = canonicalize_or_normalize(&root.join(requested))?;

    if candidate == root || !candidate.starts_with(&root) {
        return Err(CoreError::PathOutsideRoot(filename.to_string()));
    }
    Ok(candidate)
}

/// Canonicalize when the path exists, otherwise normalize `.` and `..` lexically.
fn canonicalize_or_normalize(path: &Path) -> CoreResult<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }

    let absolute = std::path::absolute(path)?;
    let mut result = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    Ok(result)
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` using an atomic replace pattern.
///
/// Writes a sibling temporary file, syncs it, then renames it into place.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    let written = (|| -> CoreResult<()> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    atomic_replace(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Sibling temp path used while a file is being written.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    tmp.set_file_name(format!(".{file_name}.tmp"));
    tmp
}

fn bak_path_for(path: &Path) -> PathBuf {
    let mut bak = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bak".to_string());
    bak.set_file_name(format!(".{file_name}.bak"));
    bak
}

/// Moves a fully written temp file to `dest`, replacing any existing file.
pub fn atomic_replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        if let Err(e) = std::fs::rename(src_tmp, dest) {
            let _ = std::fs::remove_file(src_tmp);
            return Err(CoreError::IoError(e));
        }
        return Ok(());
    }

    // Windows: rename-over-existing may fail depending on filesystem; use a backup swap.
    let bak = bak_path_for(dest);
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_bytes_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("manifest.json");

        atomic_write_bytes(&path, b"one").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one");

        atomic_write_bytes(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!tmp_path_for(&path).exists());
    }

    // =========================================================================
    // Path Validation Tests
    // =========================================================================

    #[test]
    fn test_validate_path_id_component() {
        assert!(validate_path_id_component("01HXYZ123ABC", "projectId").is_ok());
        assert!(validate_path_id_component("scene.with.dots", "sceneId").is_ok());

        for bad in ["", "  ", "..", "foo/bar", "foo\\bar", "C:", "a\0b"] {
            let err = validate_path_id_component(bad, "projectId").unwrap_err();
            assert!(matches!(err, CoreError::ValidationError(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_resolve_served_file_inside_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("scene_a.png"), b"png").unwrap();

        let resolved = resolve_served_file(dir.path(), "scene_a.png").unwrap();
        assert!(resolved.ends_with("scene_a.png"));

        // Missing files still resolve; existence is the caller's concern.
        assert!(resolve_served_file(dir.path(), "missing.png").is_ok());
    }

    #[test]
    fn test_resolve_served_file_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("images");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();

        for bad in [
            "../secret.txt",
            "../../etc/passwd",
            "a/../../secret.txt",
            "/etc/passwd",
            "..",
            ".",
            "",
        ] {
            let err = resolve_served_file(&root, bad).unwrap_err();
            assert!(matches!(err, CoreError::PathOutsideRoot(_)), "{bad:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_served_file_rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("images");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.png")).unwrap();

        let err = resolve_served_file(&root, "link.png").unwrap_err();
        assert!(matches!(err, CoreError::PathOutsideRoot(_)));
    }
}
