//! Common test utilities shared across integration tests.

use std::sync::Arc;

use secrecy::SecretString;
use secretkit_core::{
    DeviceKeystore, FileSecretStore, LocalKeystore, MasterKey, PrefsSecretStore, SecretBackend,
    SecretKitConfig, SecretStore, StorageError, StoragePaths, StorageResult,
    DEFAULT_MASTER_KEY_ALIAS,
};
use tempfile::TempDir;

/// Keystore that refuses every operation.
pub struct FailingKeystore;

impl DeviceKeystore for FailingKeystore {
    fn seal(&self, _associated_data: &[u8], _plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        Err(StorageError::Keystore("keystore locked".to_string()))
    }

    fn open(&self, _associated_data: &[u8], _ciphertext: &[u8]) -> StorageResult<Vec<u8>> {
        Err(StorageError::Keystore("keystore locked".to_string()))
    }
}

/// Temporary storage root, removed on drop.
pub struct TestRoot {
    _dir: TempDir,
    /// Storage paths rooted in the temporary directory.
    pub paths: StoragePaths,
}

/// Creates a fresh temporary storage root.
pub fn temp_root() -> TestRoot {
    let dir = tempfile::Builder::new()
        .prefix("secretkit-test-")
        .tempdir()
        .expect("create temp root");
    let paths = StoragePaths::new(dir.path());
    TestRoot { _dir: dir, paths }
}

/// Opens the file-backed keystore of `paths`, as a second app launch would.
pub fn local_keystore(paths: &StoragePaths) -> Arc<dyn DeviceKeystore> {
    Arc::new(
        LocalKeystore::open(paths.keystore_dir(), DEFAULT_MASTER_KEY_ALIAS)
            .expect("open local keystore"),
    )
}

/// Opens a store of the given backend with the default configuration.
pub fn open_store(
    backend: SecretBackend,
    paths: &StoragePaths,
    keystore: Arc<dyn DeviceKeystore>,
) -> StorageResult<Box<dyn SecretStore>> {
    let config = SecretKitConfig::default();
    let master_key = MasterKey::builder(keystore)
        .alias(config.master_key_alias.clone())
        .build()?;
    let store: Box<dyn SecretStore> = match backend {
        SecretBackend::File => Box::new(FileSecretStore::new(paths, &config, master_key)?),
        SecretBackend::Preferences => {
            Box::new(PrefsSecretStore::open(paths, &config, &master_key)?)
        }
    };
    Ok(store)
}

/// Opens a fresh store instance and reads its secret.
pub fn read_secret(
    backend: SecretBackend,
    paths: &StoragePaths,
    keystore: Arc<dyn DeviceKeystore>,
) -> StorageResult<Option<SecretString>> {
    open_store(backend, paths, keystore)?.get()
}
