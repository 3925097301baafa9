//! Platform interfaces the providers depend on.
//!
//! - [`DeviceKeystore`] seals and opens small payloads (wrapped data keys)
//!   under a key that never leaves the platform keystore.
//! - [`AtomicBlobStore`] persists small named blobs (preference namespaces)
//!   with write-to-temp-then-rename semantics.
//!
//! On a device the host app supplies the keystore (Android Keystore, iOS
//! Keychain). [`LocalKeystore`](super::LocalKeystore) and
//! [`EphemeralKeystore`](super::EphemeralKeystore) cover desktop use and tests.

use crate::error::StorageResult;

/// Device-protected encryption for wrapping data keys.
///
/// # Security Requirements
///
/// - The device key SHOULD be non-exportable when the platform supports it.
/// - Implementations MUST use authenticated encryption (AEAD) and MUST include
///   `associated_data` in the authentication tag.
pub trait DeviceKeystore: Send + Sync {
    /// Seals plaintext under the device-bound key, authenticating `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore refuses the operation or the seal fails.
    fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> StorageResult<Vec<u8>>;

    /// Opens ciphertext produced by [`Self::seal`].
    ///
    /// The same associated data used during sealing must be supplied or the
    /// open operation must fail.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, the ciphertext is malformed or
    /// the keystore is unavailable.
    fn open(&self, associated_data: &[u8], ciphertext: &[u8]) -> StorageResult<Vec<u8>>;
}

/// Atomic storage for small named blobs.
///
/// Writes MUST leave the target either with the complete old content or the
/// complete new content, never a partial write.
pub trait AtomicBlobStore: Send + Sync {
    /// Reads a blob by name.
    ///
    /// Returns `Ok(None)` if the blob does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails (e.g. permission denied).
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically writes a blob, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Deletes a blob. Deleting a missing blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for actual I/O failures.
    fn delete(&self, name: &str) -> StorageResult<()>;

    /// Checks if a blob exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.read(name)?.is_some())
    }
}
