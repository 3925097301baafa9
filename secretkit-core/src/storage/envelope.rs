//! Wrapped data key envelope.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

const ENVELOPE_VERSION: u32 = 1;

/// A data key sealed by the master key, as persisted next to the data it
/// protects (in the encrypted file header and in the preferences blob).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEnvelope {
    pub(crate) version: u32,
    pub(crate) wrapped_key: Vec<u8>,
}

impl KeyEnvelope {
    pub(crate) const fn new(wrapped_key: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            wrapped_key,
        }
    }

    /// Checks the version after deserializing as part of a larger record.
    pub(crate) fn validate(&self) -> StorageResult<()> {
        if self.version != ENVELOPE_VERSION {
            return Err(StorageError::UnsupportedVersion(self.version));
        }
        if self.wrapped_key.is_empty() {
            return Err(StorageError::InvalidEnvelope(
                "wrapped key is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serializes a record to CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;
    Ok(bytes)
}

/// Deserializes a CBOR record.
pub fn from_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> StorageResult<T> {
    ciborium::de::from_reader(bytes).map_err(|err| StorageError::Serialization(err.to_string()))
}
