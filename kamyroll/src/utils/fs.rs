//! Filesystem helpers with operation + path context on errors.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    ensure_dir_all_with_op("creating directory", parent).await
}

/// Synchronous variant, used before the runtime's file machinery is needed.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Write `data` to a new `kamyroll_*.<suffix>` file in the temp directory.
///
/// The file is kept on disk; callers own its removal.
pub async fn write_kept_tempfile(suffix: &str, data: &[u8]) -> Result<PathBuf> {
    let temp_dir = std::env::temp_dir();
    let path = tempfile::Builder::new()
        .prefix("kamyroll_")
        .suffix(suffix)
        .tempfile_in(&temp_dir)
        .map_err(|e| Error::io_path("creating temp file in", &temp_dir, e))?
        .into_temp_path()
        .keep()
        .map_err(|e| Error::io_path("keeping temp file", &e.path.to_path_buf(), e.error))?;

    tokio::fs::write(&path, data)
        .await
        .map_err(|e| Error::io_path("writing", &path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a/b/c.mkv");
        ensure_parent_dir(&file).await.unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[tokio::test]
    async fn bare_file_name_has_nothing_to_create() {
        ensure_parent_dir(Path::new("video.mkv")).await.unwrap();
    }

    #[tokio::test]
    async fn kept_tempfile_survives() {
        let path = write_kept_tempfile(".jpeg", b"\xff\xd8\xff").await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("kamyroll_"));
        assert!(name.ends_with(".jpeg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\xff\xd8\xff");
        std::fs::remove_file(path).unwrap();
    }
}
