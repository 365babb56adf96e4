use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{MirrorError, Result};

/// The output root. Every path handed in is relative to it and is rejected
/// if it would resolve outside of it.
#[derive(Clone, Debug)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let base_dir = base_dir.to_path_buf();
        fs::create_dir_all(&base_dir).map_err(|e| MirrorError::io(&base_dir, e))?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute location of `relative_path` under the root.
    pub fn path_for(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative_path.is_empty() {
            return Err(MirrorError::PathEscape(relative_path.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }

    pub async fn ensure_dir(&self, relative_path: &str) -> Result<PathBuf> {
        let dir = self.path_for(relative_path)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MirrorError::io(&dir, e))?;
        Ok(dir)
    }

    /// Writes `content`, creating parent directories first.
    pub async fn write_file(&self, relative_path: &str, content: &[u8]) -> Result<PathBuf> {
        let file_path = self.path_for(relative_path)?;
        if let Some((parent, _)) = relative_path.rsplit_once('/') {
            self.ensure_dir(parent).await?;
        }

        tokio::fs::write(&file_path, content)
            .await
            .map_err(|e| MirrorError::io(&file_path, e))?;

        Ok(file_path)
    }
}
