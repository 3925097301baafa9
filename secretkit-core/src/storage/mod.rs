//! Storage primitives: paths, platform seams, master key and key envelopes.

pub(crate) mod envelope;
pub mod paths;
pub mod traits;

mod blob_store;
mod keystore;
mod master_key;

#[cfg(test)]
pub(crate) mod tests_utils;

pub use blob_store::FsBlobStore;
pub use keystore::{EphemeralKeystore, LocalKeystore};
pub use master_key::{MasterKey, MasterKeyBuilder};
pub use paths::StoragePaths;
pub use traits::{AtomicBlobStore, DeviceKeystore};

pub(crate) use master_key::{DataKey, DATA_KEY_SIZE};

pub use crate::error::{StorageError, StorageResult};
