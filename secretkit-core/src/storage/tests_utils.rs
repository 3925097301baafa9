//! Test helpers for the storage seams.

use std::{collections::HashMap, sync::Mutex};

use crate::error::{StorageError, StorageResult};

use super::traits::AtomicBlobStore;

pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrites a blob directly, bypassing any provider on top.
    pub fn tamper(&self, name: &str, edit: impl FnOnce(&mut Vec<u8>)) {
        let mut guard = self.blobs.lock().expect("lock");
        let blob = guard.get_mut(name).expect("blob present");
        edit(blob);
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicBlobStore for InMemoryBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let guard = self
            .blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))?;
        Ok(guard.get(name).cloned())
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))?
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))?
            .remove(name);
        Ok(())
    }
}

/// Blob store that reads nothing and refuses every write.
pub struct ReadOnlyBlobStore;

impl AtomicBlobStore for ReadOnlyBlobStore {
    fn read(&self, _name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn write_atomic(&self, name: &str, _bytes: &[u8]) -> StorageResult<()> {
        Err(StorageError::BlobStore(format!("{name} is read-only")))
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        Err(StorageError::BlobStore(format!("{name} is read-only")))
    }
}
