//! Error types for secret storage components.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

type DynError = dyn std::error::Error + Send + Sync;

/// Errors raised by the secret stores and the providers beneath them.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum StorageError {
    /// Errors coming from the device keystore.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// Errors coming from the blob store.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// An I/O operation failed.
    #[error("{context}: {source}")]
    Io {
        /// Context describing the operation.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cryptographic failures (AEAD, HKDF, etc.).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Invalid or malformed key envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Unsupported envelope or header version.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    /// The file does not start with the expected magic bytes.
    #[error("invalid magic in {0}")]
    InvalidMagic(String),

    /// Encrypted output refuses to overwrite an existing file.
    #[error("output file already exists: {0}")]
    FileExists(String),

    /// Ciphertext ended before the final segment.
    #[error("truncated ciphertext: {0}")]
    Truncated(String),

    /// Invalid input parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Wraps an I/O error with a description of the failed operation.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Converts into an [`std::io::Error`] for the `Read`/`Write` stream adapters.
    ///
    /// I/O errors keep their kind; everything else becomes `InvalidData`.
    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            Self::Io { source, .. } => source,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }

    /// Recovers a [`StorageError`] from an I/O error produced by a stream adapter.
    pub(crate) fn from_io(context: &str, err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(<DynError>::is::<Self>) {
            if let Some(Ok(storage)) = err.into_inner().map(<DynError>::downcast::<Self>) {
                return *storage;
            }
            return Self::InvalidInput(format!("{context}: stream error lost its source"));
        }
        Self::io(context, err)
    }
}
