use std::sync::Arc;

use secrecy::SecretString;

use crate::config::SecretKitConfig;
use crate::encrypted_prefs::EncryptedPreferences;
use crate::error::{StorageError, StorageResult};
use crate::storage::{AtomicBlobStore, FsBlobStore, MasterKey, StoragePaths};

use super::{SecretBackend, SecretStore};

/// Secret store backed by one key of an encrypted preferences namespace.
#[derive(Debug)]
pub struct PrefsSecretStore {
    prefs: EncryptedPreferences,
    key: String,
}

impl PrefsSecretStore {
    /// Opens `config.prefs_name` under `shared_prefs/` of `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the existing
    /// namespace cannot be opened with `master_key`.
    pub fn open(
        paths: &StoragePaths,
        config: &SecretKitConfig,
        master_key: &MasterKey,
    ) -> StorageResult<Self> {
        config.validate()?;
        let blob_store = Arc::new(FsBlobStore::new(paths.shared_prefs_dir())?);
        Self::with_blob_store(blob_store, config, master_key)
    }

    /// Opens the namespace over an arbitrary blob store.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing namespace cannot be opened with
    /// `master_key`.
    pub fn with_blob_store(
        blob_store: Arc<dyn AtomicBlobStore>,
        config: &SecretKitConfig,
        master_key: &MasterKey,
    ) -> StorageResult<Self> {
        let prefs = EncryptedPreferences::open(blob_store, config.prefs_name.clone(), master_key)?;
        Ok(Self {
            prefs,
            key: config.prefs_secret_key.clone(),
        })
    }

    /// Opens the namespace like [`Self::open`], discarding it first if it can
    /// no longer be opened with `master_key`.
    ///
    /// Only damaged or foreign data is discarded: keystore and I/O failures
    /// still propagate. Used on the save path so a lost master key does not
    /// lock the preferences backend for good.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the keystore fails,
    /// or the namespace cannot be read or reset.
    pub fn open_or_reset(
        paths: &StoragePaths,
        config: &SecretKitConfig,
        master_key: &MasterKey,
    ) -> StorageResult<Self> {
        config.validate()?;
        let blob_store: Arc<dyn AtomicBlobStore> =
            Arc::new(FsBlobStore::new(paths.shared_prefs_dir())?);
        Self::with_blob_store_or_reset(blob_store, config, master_key)
    }

    fn with_blob_store_or_reset(
        blob_store: Arc<dyn AtomicBlobStore>,
        config: &SecretKitConfig,
        master_key: &MasterKey,
    ) -> StorageResult<Self> {
        match Self::with_blob_store(blob_store.clone(), config, master_key) {
            Err(
                err @ (StorageError::Crypto(_)
                | StorageError::InvalidEnvelope(_)
                | StorageError::UnsupportedVersion(_)
                | StorageError::Serialization(_)),
            ) => {
                log::warn!(
                    "preferences {} cannot be opened, resetting: {err}",
                    config.prefs_name
                );
                let prefs = EncryptedPreferences::reset(
                    blob_store,
                    config.prefs_name.clone(),
                    master_key,
                )?;
                Ok(Self {
                    prefs,
                    key: config.prefs_secret_key.clone(),
                })
            }
            other => other,
        }
    }

    /// Returns the underlying preferences namespace.
    #[must_use]
    pub const fn preferences(&self) -> &EncryptedPreferences {
        &self.prefs
    }
}

impl SecretStore for PrefsSecretStore {
    fn save(&self, secret: &str) -> StorageResult<()> {
        self.prefs.edit().put_string(&self.key, secret).commit()?;
        log::info!("secret saved to preferences {}", self.prefs.name());
        Ok(())
    }

    fn get(&self) -> StorageResult<Option<SecretString>> {
        Ok(self
            .prefs
            .get_string(&self.key)?
            .filter(|secret| !secret.is_empty())
            .map(SecretString::from))
    }

    fn delete(&self) -> StorageResult<()> {
        if !self.prefs.contains(&self.key)? {
            return Ok(());
        }
        self.prefs.edit().remove(&self.key).commit()?;
        log::info!("secret removed from preferences {}", self.prefs.name());
        Ok(())
    }

    fn backend(&self) -> SecretBackend {
        SecretBackend::Preferences
    }
}
