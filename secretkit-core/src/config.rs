//! Names of the persisted artifacts and the master-key alias.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::logger::{set_log_level, LogLevel};

/// Default name of the encrypted secret file inside `files/`.
pub const DEFAULT_SECRET_FILE_NAME: &str = "secret_file.txt";

/// Default name of the encrypted preferences namespace inside `shared_prefs/`.
pub const DEFAULT_PREFS_NAME: &str = "sharedPrefs";

/// Default preferences key holding the secret.
pub const DEFAULT_PREFS_SECRET_KEY: &str = "PASSWORD";

/// Default alias of the master key in the device keystore.
pub const DEFAULT_MASTER_KEY_ALIAS: &str = "_secretkit_master_key_";

/// Configuration shared by the stores and the screen controller.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use secretkit_core::SecretKitConfig;
///
/// let config = SecretKitConfig::from_json(r#"{ "prefs_name": "vault" }"#).unwrap();
/// assert_eq!(config.prefs_name, "vault");
/// assert_eq!(config.secret_file_name, "secret_file.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretKitConfig {
    /// File name of the encrypted secret file.
    pub secret_file_name: String,
    /// Name of the encrypted preferences namespace.
    pub prefs_name: String,
    /// Key under which the preferences backend stores the secret.
    pub prefs_secret_key: String,
    /// Alias of the master key in the device keystore.
    pub master_key_alias: String,
    /// Least severe level forwarded to the host logger.
    pub log_level: LogLevel,
}

impl Default for SecretKitConfig {
    fn default() -> Self {
        Self {
            secret_file_name: DEFAULT_SECRET_FILE_NAME.to_string(),
            prefs_name: DEFAULT_PREFS_NAME.to_string(),
            prefs_secret_key: DEFAULT_PREFS_SECRET_KEY.to_string(),
            master_key_alias: DEFAULT_MASTER_KEY_ALIAS.to_string(),
            log_level: LogLevel::Debug,
        }
    }
}

impl SecretKitConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] for malformed JSON and
    /// [`StorageError::InvalidInput`] if a field fails validation.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Makes [`Self::log_level`] the process-wide log level.
    pub fn apply_log_level(&self) {
        set_log_level(self.log_level);
    }

    /// Checks that every name is usable.
    ///
    /// File and namespace names must be single path components; the
    /// preferences key and alias must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] naming the offending field.
    pub fn validate(&self) -> StorageResult<()> {
        validate_file_name("secret_file_name", &self.secret_file_name)?;
        validate_file_name("prefs_name", &self.prefs_name)?;
        if self.prefs_secret_key.is_empty() {
            return Err(StorageError::InvalidInput(
                "prefs_secret_key must not be empty".to_string(),
            ));
        }
        if self.master_key_alias.is_empty() {
            return Err(StorageError::InvalidInput(
                "master_key_alias must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_file_name(field: &str, name: &str) -> StorageResult<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(format!(
            "{field} must be a plain file name, got {name:?}"
        )))
    }
}
