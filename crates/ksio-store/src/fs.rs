//! File-system backend: keys are file paths.
//!
//! Without a root, a key is used verbatim as a path, absolute or relative to
//! the process working directory. With a root, keys must be relative and
//! must not climb out of the root.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use ksio_types::Key;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageBackend;

/// Storage backend over the local file system.
#[derive(Clone, Debug, Default)]
pub struct FsBackend {
    root: Option<PathBuf>,
    atomic_writes: bool,
}

impl FsBackend {
    /// Backend that treats keys as paths as-is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that confines keys under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            atomic_writes: false,
        }
    }

    /// Write through a temporary file in the target directory and rename it
    /// over the target, so a failed write never leaves a truncated file.
    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// The configured root, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Map a key to the path it addresses.
    pub fn resolve(&self, key: &Key) -> StoreResult<PathBuf> {
        let path = Path::new(key.as_str());
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StoreError::InvalidKey {
                        key: key.clone(),
                        reason: "must not contain '..' under a storage root".into(),
                    })
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::InvalidKey {
                        key: key.clone(),
                        reason: "must be relative under a storage root".into(),
                    })
                }
            }
        }
        Ok(root.join(path))
    }

    /// Refuse paths that exist but are not regular files.
    fn require_file(key: &Key, path: &Path) -> StoreResult<()> {
        match fs::metadata(path) {
            Ok(meta) if !meta.is_file() => Err(StoreError::NotAFile(key.clone())),
            _ => Ok(()),
        }
    }

    fn write_atomic(&self, key: &Key, path: &Path, data: &[u8]) -> StoreResult<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::from_io(key, e))?;
        tmp.write_all(data).map_err(|e| StoreError::from_io(key, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::from_io(key, e))?;
        tmp.persist(path)
            .map_err(|e| StoreError::from_io(key, e.error))?;
        Ok(())
    }
}

impl StorageBackend for FsBackend {
    fn read(&self, key: &Key) -> StoreResult<Vec<u8>> {
        let path = self.resolve(key)?;
        Self::require_file(key, &path)?;
        let data = fs::read(&path).map_err(|e| StoreError::from_io(key, e))?;
        debug!(key = %key, len = data.len(), "file read");
        Ok(data)
    }

    fn write(&self, key: &Key, data: &[u8]) -> StoreResult<()> {
        let path = self.resolve(key)?;
        Self::require_file(key, &path)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::from_io(key, e))?;
            }
        }
        if self.atomic_writes {
            self.write_atomic(key, &path, data)?;
        } else {
            fs::write(&path, data).map_err(|e| StoreError::from_io(key, e))?;
        }
        debug!(key = %key, len = data.len(), atomic = self.atomic_writes, "file written");
        Ok(())
    }

    fn exists(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.resolve(key)?.is_file())
    }
}
