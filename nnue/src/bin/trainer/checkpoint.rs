use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use candle_nn::VarMap;

const BEST_FILE: &str = "best.safetensors";

/// One training run's directory, `<root>/v<n>`, holding a checkpoint per epoch
/// and a copy of the weights with the lowest validation loss.
pub struct CheckpointDir {
    path: PathBuf,
}

impl CheckpointDir {
    /// Creates the next unused version directory under `root`.
    pub fn create_next(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;

        let next = match latest_version(root)? {
            Some(latest) => latest + 1,
            None => 0,
        };
        let path = root.join(format!("v{}", next));
        fs::create_dir(&path)?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.path.join(format!("epoch-{}.safetensors", epoch))
    }

    pub fn best_path(&self) -> PathBuf {
        self.path.join(BEST_FILE)
    }

    pub fn save_epoch(&self, varmap: &VarMap, epoch: usize) -> candle_core::Result<PathBuf> {
        let path = self.epoch_path(epoch);
        varmap.save(&path)?;
        Ok(path)
    }

    pub fn save_best(&self, varmap: &VarMap) -> candle_core::Result<()> {
        varmap.save(self.best_path())
    }

    pub fn delete_epoch(&self, epoch: usize) -> io::Result<()> {
        let path = self.epoch_path(epoch);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

fn latest_version(root: &Path) -> io::Result<Option<u32>> {
    let mut latest = None;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(version) = name.strip_prefix('v').and_then(|v| v.parse::<u32>().ok()) {
            latest = latest.max(Some(version));
        }
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_increment() {
        let root = tempfile::tempdir().unwrap();

        let first = CheckpointDir::create_next(root.path()).unwrap();
        let second = CheckpointDir::create_next(root.path()).unwrap();

        assert_eq!(first.path(), root.path().join("v0"));
        assert_eq!(second.path(), root.path().join("v1"));
    }

    #[test]
    fn test_unrelated_entries_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("v7")).unwrap();
        fs::create_dir(root.path().join("scratch")).unwrap();
        fs::write(root.path().join("v9"), b"not a directory").unwrap();

        let dir = CheckpointDir::create_next(root.path()).unwrap();
        assert_eq!(dir.path(), root.path().join("v8"));
    }

    #[test]
    fn test_delete_missing_epoch_is_ok() {
        let root = tempfile::tempdir().unwrap();
        let dir = CheckpointDir::create_next(root.path()).unwrap();

        fs::write(dir.epoch_path(3), b"weights").unwrap();
        dir.delete_epoch(3).unwrap();
        assert!(!dir.epoch_path(3).exists());
        dir.delete_epoch(3).unwrap();
    }
}
