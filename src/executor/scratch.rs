//! Scratch artifact: a private temp directory holding the script

use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

pub const SCRIPT_NAME: &str = "main.py";

pub struct Scratch {
    dir: TempDir,
    script: PathBuf,
}

impl Scratch {
    /// Create a uniquely named directory and write the source into it
    pub async fn create(source: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("sandbox-").tempdir()?;
        // the container user must be able to traverse into it
        fs::set_permissions(dir.path(), Permissions::from_mode(0o755)).await?;

        let script = dir.path().join(SCRIPT_NAME);
        fs::write(&script, source).await?;
        fs::set_permissions(&script, Permissions::from_mode(0o644)).await?;

        Ok(Self { dir, script })
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Remove the directory, logging failures
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        // the script may have left directories it cannot be removed from
        unlock_dirs(&path);
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove scratch directory {:?}: {}", path, e);
        }
    }
}

/// Make every directory below `dir` owner-writable. Symlinks are not followed.
fn unlock_dirs(dir: &Path) {
    if let Err(e) = std::fs::set_permissions(dir, Permissions::from_mode(0o700)) {
        debug!("Failed to unlock {:?}: {}", dir, e);
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => unlock_dirs(&path),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_cleanup() {
        let scratch = Scratch::create("print('hi')\n").await.unwrap();
        let script = scratch.script().to_path_buf();
        let dir = script.parent().unwrap().to_path_buf();

        assert_eq!(std::fs::read_to_string(&script).unwrap(), "print('hi')\n");
        let mode = std::fs::metadata(&script).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sandbox-"));

        scratch.cleanup();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let a = Scratch::create("").await.unwrap();
        let b = Scratch::create("").await.unwrap();
        assert_ne!(a.script(), b.script());
        a.cleanup();
        b.cleanup();
    }

    #[tokio::test]
    async fn test_cleanup_removes_locked_subdirectories() {
        let scratch = Scratch::create("").await.unwrap();
        let dir = scratch.script().parent().unwrap().to_path_buf();

        let outer = dir.join("locked");
        let inner = outer.join("deeper");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("data.txt"), "x").unwrap();
        std::fs::set_permissions(&inner, Permissions::from_mode(0o000)).unwrap();
        std::fs::set_permissions(&outer, Permissions::from_mode(0o000)).unwrap();

        scratch.cleanup();
        assert!(!dir.exists());
    }
}
