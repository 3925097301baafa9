//! The single-secret store interface and its two backends.
//!
//! Both backends persist one secret string under a master key:
//!
//! - [`FileSecretStore`] writes it to an [`EncryptedFile`](crate::encrypted_file::EncryptedFile)
//!   (`files/secret_file.txt` by default).
//! - [`PrefsSecretStore`] keeps it under one key of an
//!   [`EncryptedPreferences`](crate::encrypted_prefs::EncryptedPreferences)
//!   namespace (`PASSWORD` in `sharedPrefs` by default).

use secrecy::SecretString;

use crate::error::StorageResult;

mod file;
mod prefs;

pub use file::FileSecretStore;
pub use prefs::PrefsSecretStore;

/// Which backend a [`SecretStore`] persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SecretBackend {
    /// Encrypted file.
    File,
    /// Encrypted preferences.
    Preferences,
}

/// Persists, reads and erases one secret string.
///
/// A store holds at most one secret. Saving replaces it, and an empty saved
/// value reads back as absent.
pub trait SecretStore: Send + Sync {
    /// Persists `secret`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be encrypted or written.
    fn save(&self, secret: &str) -> StorageResult<()>;

    /// Reads the secret back.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored value is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if stored data exists but cannot be decrypted or
    /// authenticated.
    fn get(&self) -> StorageResult<Option<SecretString>>;

    /// Erases the secret. Erasing an absent secret succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing data cannot be removed.
    fn delete(&self) -> StorageResult<()>;

    /// Returns which backend this store writes to.
    fn backend(&self) -> SecretBackend;

    /// Reads the secret, degrading failures and absence to an empty string.
    ///
    /// Failures are logged at warn level.
    fn get_or_empty(&self) -> SecretString {
        match self.get() {
            Ok(Some(secret)) => secret,
            Ok(None) => SecretString::from(String::new()),
            Err(err) => {
                log::warn!("failed to read secret from {} store: {err}", self.backend());
                SecretString::from(String::new())
            }
        }
    }
}
