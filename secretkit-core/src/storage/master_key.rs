//! Master key handle and per-artifact data keys.
//!
//! The master key never leaves the [`DeviceKeystore`]. Each protected artifact
//! (an encrypted file, a preferences namespace) gets its own random
//! [`DataKey`], which is sealed under the master key and stored next to the
//! artifact in a [`KeyEnvelope`]:
//!
//! ```text
//! DeviceKeystore (alias)
//!     ├─► data key of files/secret_file.txt   (AD: alias || 0 || "file:secret_file.txt")
//!     └─► data key of shared_prefs/sharedPrefs (AD: alias || 0 || "prefs:sharedPrefs")
//! ```

use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::DEFAULT_MASTER_KEY_ALIAS;
use crate::error::{StorageError, StorageResult};

use super::envelope::KeyEnvelope;
use super::keystore::EphemeralKeystore;
use super::traits::DeviceKeystore;

pub const DATA_KEY_SIZE: usize = 32;

/// Symmetric key protecting one artifact. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; DATA_KEY_SIZE]);

impl DataKey {
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; DATA_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; DATA_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey").field("key", &"[REDACTED]").finish()
    }
}

/// Handle on the device-bound master key.
///
/// Cheap to clone; clones share the same keystore.
#[derive(Clone)]
pub struct MasterKey {
    keystore: Arc<dyn DeviceKeystore>,
    alias: String,
}

impl MasterKey {
    /// Starts building a master key over `keystore`.
    #[must_use]
    pub fn builder(keystore: Arc<dyn DeviceKeystore>) -> MasterKeyBuilder {
        MasterKeyBuilder {
            keystore,
            alias: DEFAULT_MASTER_KEY_ALIAS.to_string(),
        }
    }

    /// Generates a session-only master key over a fresh [`EphemeralKeystore`].
    #[must_use]
    pub fn generate() -> Self {
        Self {
            keystore: Arc::new(EphemeralKeystore::generate()),
            alias: DEFAULT_MASTER_KEY_ALIAS.to_string(),
        }
    }

    /// Returns the alias binding wrapped keys to this master key.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn wrap_key(&self, label: &str, key: &DataKey) -> StorageResult<KeyEnvelope> {
        let wrapped = self
            .keystore
            .seal(&self.associated_data(label), key.as_bytes())?;
        Ok(KeyEnvelope::new(wrapped))
    }

    pub(crate) fn unwrap_key(&self, label: &str, envelope: &KeyEnvelope) -> StorageResult<DataKey> {
        envelope.validate()?;
        let bytes = zeroize::Zeroizing::new(
            self.keystore
                .open(&self.associated_data(label), &envelope.wrapped_key)?,
        );
        if bytes.len() != DATA_KEY_SIZE {
            return Err(StorageError::InvalidEnvelope(format!(
                "data key length mismatch: expected {DATA_KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; DATA_KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(DataKey(key))
    }

    fn associated_data(&self, label: &str) -> Vec<u8> {
        let mut ad = Vec::with_capacity(self.alias.len() + 1 + label.len());
        ad.extend_from_slice(self.alias.as_bytes());
        ad.push(0);
        ad.extend_from_slice(label.as_bytes());
        ad
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`MasterKey::builder`].
pub struct MasterKeyBuilder {
    keystore: Arc<dyn DeviceKeystore>,
    alias: String,
}

impl MasterKeyBuilder {
    /// Overrides the default alias (`_secretkit_master_key_`).
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Finishes the master key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if the alias is empty.
    pub fn build(self) -> StorageResult<MasterKey> {
        if self.alias.is_empty() {
            return Err(StorageError::InvalidInput(
                "master key alias must not be empty".to_string(),
            ));
        }
        Ok(MasterKey {
            keystore: self.keystore,
            alias: self.alias,
        })
    }
}
