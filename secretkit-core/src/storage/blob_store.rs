//! File system-based atomic blob store.
//!
//! Writes follow write-to-temp-then-rename:
//!
//! 1. Write data to `.{name}.tmp` in the same directory
//! 2. `fsync` the temporary file
//! 3. Rename it over the target
//! 4. `fsync` the directory (unix) so the rename is durable
//!
//! Readers always see either the old content or the new content.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{StorageError, StorageResult};

use super::traits::AtomicBlobStore;

/// [`AtomicBlobStore`] over a single directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    directory: PathBuf,
}

impl FsBlobStore {
    /// Creates a blob store for `directory`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(directory: impl AsRef<Path>) -> StorageResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            StorageError::io(
                format!(
                    "failed to create blob store directory '{}'",
                    directory.display()
                ),
                e,
            )
        })?;
        Ok(Self { directory })
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.directory.join(name))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!(".{name}.tmp"))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        let dir = File::open(&self.directory).map_err(|e| {
            StorageError::io(
                format!(
                    "failed to open directory for sync '{}'",
                    self.directory.display()
                ),
                e,
            )
        })?;
        dir.sync_all()
            .map_err(|e| StorageError::io("failed to fsync directory", e))
    }

    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    fn sync_directory(&self) -> StorageResult<()> {
        // Directory handles cannot be synced here; rename is still atomic.
        Ok(())
    }
}

impl AtomicBlobStore for FsBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.blob_path(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(
                format!("failed to read blob '{}'", path.display()),
                e,
            )),
        }
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let final_path = self.blob_path(name)?;
        let temp_path = self.temp_path(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                StorageError::io(
                    format!("failed to create temporary file '{}'", temp_path.display()),
                    e,
                )
            })?;

        let written = file.write_all(bytes).and_then(|()| file.sync_all());
        drop(file);
        if let Err(e) = written {
            discard_temp(&temp_path);
            return Err(StorageError::io(
                format!("failed to write temporary file '{}'", temp_path.display()),
                e,
            ));
        }

        fs::rename(&temp_path, &final_path).map_err(|e| {
            discard_temp(&temp_path);
            StorageError::io(
                format!(
                    "failed to rename '{}' to '{}'",
                    temp_path.display(),
                    final_path.display()
                ),
                e,
            )
        })?;

        self.sync_directory()
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.blob_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(
                format!("failed to delete blob '{}'", path.display()),
                e,
            )),
        }
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.blob_path(name)?.exists())
    }
}

fn discard_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("failed to remove temporary file {}: {e}", path.display());
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    let ok = !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(StorageError::BlobStore(format!("invalid blob name {name:?}")))
    }
}
