//! Software device keystores.
//!
//! Both implementations hold a 256-bit device key in memory (zeroized on drop)
//! and seal with XChaCha20-Poly1305, prepending the 24-byte random nonce:
//!
//! ```text
//! sealed = nonce (24) || ciphertext || tag (16)
//! ```
//!
//! [`LocalKeystore`] persists its device key in `<keystore_dir>/<alias>.key`
//! (mode 0600 on unix). It is meant for desktop builds and development; on a
//! phone the host app passes in a keystore backed by the platform.
//! [`EphemeralKeystore`] never persists anything.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

use super::traits::DeviceKeystore;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

/// Keystore whose device key lives in a file under the storage root.
pub struct LocalKeystore {
    path: PathBuf,
    device_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl LocalKeystore {
    /// Loads the device key stored for `alias`, generating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or key file cannot be created or
    /// read, or if the stored key has the wrong length.
    pub fn open(keystore_dir: impl AsRef<Path>, alias: &str) -> StorageResult<Self> {
        if alias.is_empty() || alias.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidInput(format!(
                "invalid keystore alias {alias:?}"
            )));
        }
        let dir = keystore_dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            StorageError::io(
                format!("failed to create keystore directory '{}'", dir.display()),
                e,
            )
        })?;
        let path = dir.join(format!("{alias}.key"));

        let device_key = match fs::read(&path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                parse_device_key(&bytes)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("generating device key for alias {alias}");
                create_device_key(&path)?
            }
            Err(e) => {
                return Err(StorageError::io(
                    format!("failed to read device key '{}'", path.display()),
                    e,
                ))
            }
        };

        Ok(Self { path, device_key })
    }

    /// Returns the path of the key file.
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LocalKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeystore")
            .field("path", &self.path)
            .field("device_key", &"[REDACTED]")
            .finish()
    }
}

impl DeviceKeystore for LocalKeystore {
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        seal_with(&self.device_key, associated_data, plaintext)
    }

    fn open(&self, associated_data: &[u8], ciphertext: &[u8]) -> StorageResult<Vec<u8>> {
        open_with(&self.device_key, associated_data, ciphertext)
    }
}

/// Keystore with a random device key that lives only as long as the value.
///
/// Anything sealed with it is unreadable after the process exits.
pub struct EphemeralKeystore {
    device_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl EphemeralKeystore {
    /// Generates a fresh random device key.
    #[must_use]
    pub fn generate() -> Self {
        let mut device_key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(device_key.as_mut());
        Self { device_key }
    }
}

impl Default for EphemeralKeystore {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Debug for EphemeralKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeystore")
            .field("device_key", &"[REDACTED]")
            .finish()
    }
}

impl DeviceKeystore for EphemeralKeystore {
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        seal_with(&self.device_key, associated_data, plaintext)
    }

    fn open(&self, associated_data: &[u8], ciphertext: &[u8]) -> StorageResult<Vec<u8>> {
        open_with(&self.device_key, associated_data, ciphertext)
    }
}

fn parse_device_key(bytes: &[u8]) -> StorageResult<Zeroizing<[u8; KEY_SIZE]>> {
    if bytes.len() != KEY_SIZE {
        return Err(StorageError::Keystore(format!(
            "device key has invalid length: {} (expected {KEY_SIZE})",
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(bytes);
    Ok(key)
}

fn create_device_key(path: &Path) -> StorageResult<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| {
        StorageError::io(
            format!("failed to create device key '{}'", path.display()),
            e,
        )
    })?;
    file.write_all(key.as_ref())
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            StorageError::io(
                format!("failed to write device key '{}'", path.display()),
                e,
            )
        })?;
    Ok(key)
}

fn seal_with(
    key: &[u8; KEY_SIZE],
    associated_data: &[u8],
    plaintext: &[u8],
) -> StorageResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|err| StorageError::Crypto(err.to_string()))?;
    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_with(
    key: &[u8; KEY_SIZE],
    associated_data: &[u8],
    ciphertext: &[u8],
) -> StorageResult<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(StorageError::InvalidEnvelope(
            "keystore ciphertext too short".to_string(),
        ));
    }
    let (nonce_bytes, payload) = ciphertext.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: payload,
                aad: associated_data,
            },
        )
        .map_err(|err| StorageError::Crypto(err.to_string()))
}
