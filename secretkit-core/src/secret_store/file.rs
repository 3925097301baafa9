use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use secrecy::SecretString;

use crate::config::SecretKitConfig;
use crate::encrypted_file::EncryptedFile;
use crate::error::{StorageError, StorageResult};
use crate::storage::{MasterKey, StoragePaths};

use super::{SecretBackend, SecretStore};

/// Secret store backed by an encrypted file under `files/`.
#[derive(Debug)]
pub struct FileSecretStore {
    file: EncryptedFile,
}

impl FileSecretStore {
    /// Creates the store for `config.secret_file_name` under `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if the configuration is invalid.
    pub fn new(
        paths: &StoragePaths,
        config: &SecretKitConfig,
        master_key: MasterKey,
    ) -> StorageResult<Self> {
        config.validate()?;
        let file =
            EncryptedFile::builder(paths.file_path(&config.secret_file_name), master_key).build()?;
        Ok(Self { file })
    }

    /// Returns the path of the encrypted file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl SecretStore for FileSecretStore {
    fn save(&self, secret: &str) -> StorageResult<()> {
        // Encrypted output never overwrites, so replace by delete then create.
        self.delete()?;
        let mut writer = self.file.open_file_output()?;
        writer
            .write_all(secret.as_bytes())
            .map_err(|e| StorageError::from_io("failed to write secret", e))?;
        writer
            .finish()?
            .sync_all()
            .map_err(|e| StorageError::io("failed to sync secret file", e))?;
        log::info!("secret saved to {}", self.file.path().display());
        Ok(())
    }

    fn get(&self) -> StorageResult<Option<SecretString>> {
        let mut reader = match self.file.open_file_input() {
            Ok(reader) => reader,
            Err(StorageError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let mut secret = String::new();
        reader
            .read_to_string(&mut secret)
            .map_err(|e| StorageError::from_io("failed to read secret", e))?;
        if secret.is_empty() {
            return Ok(None);
        }
        Ok(Some(SecretString::from(secret)))
    }

    fn delete(&self) -> StorageResult<()> {
        match fs::remove_file(self.file.path()) {
            Ok(()) => {
                log::info!("secret file {} deleted", self.file.path().display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(
                format!("failed to delete '{}'", self.file.path().display()),
                e,
            )),
        }
    }

    fn backend(&self) -> SecretBackend {
        SecretBackend::File
    }
}
