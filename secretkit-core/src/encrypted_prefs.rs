//! Encrypted key-value preferences.
//!
//! A namespace is persisted as one CBOR blob in an [`AtomicBlobStore`]:
//!
//! ```text
//! PrefsFile {
//!     version,
//!     key:     KeyEnvelope            // data key wrapped by the master key
//!     entries: { token -> nonce || ciphertext }
//! }
//! ```
//!
//! Key names are replaced by deterministic tokens (HMAC-style HKDF extract
//! under a key derived from the data key), so neither key names nor values
//! appear in the clear. Each value is sealed together with its key name and
//! bound to its token through the associated data.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};
use crate::storage::envelope::{from_cbor, to_cbor, KeyEnvelope};
use crate::storage::{AtomicBlobStore, DataKey, MasterKey, DATA_KEY_SIZE};

const PREFS_VERSION: u32 = 1;
const TOKEN_KEY_INFO: &[u8] = b"secretkit:prefs:key-token";
const VALUE_KEY_INFO: &[u8] = b"secretkit:prefs:value";
const VALUE_NONCE_SIZE: usize = 24;

/// A typed preference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefValue {
    /// UTF-8 text.
    String(String),
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
}

impl PrefValue {
    const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PrefsFile {
    version: u32,
    key: KeyEnvelope,
    entries: BTreeMap<String, Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct PrefEntry {
    key: String,
    value: PrefValue,
}

struct PrefsKeys {
    token_key: Zeroizing<[u8; DATA_KEY_SIZE]>,
    value_cipher: XChaCha20Poly1305,
}

impl PrefsKeys {
    fn derive(data_key: &DataKey) -> StorageResult<Self> {
        let hk = Hkdf::<Sha256>::new(None, data_key.as_bytes());
        let mut token_key = Zeroizing::new([0u8; DATA_KEY_SIZE]);
        hk.expand(TOKEN_KEY_INFO, &mut token_key[..])
            .map_err(|err| StorageError::Crypto(err.to_string()))?;
        let mut value_key = Zeroizing::new([0u8; DATA_KEY_SIZE]);
        hk.expand(VALUE_KEY_INFO, &mut value_key[..])
            .map_err(|err| StorageError::Crypto(err.to_string()))?;
        Ok(Self {
            token_key,
            value_cipher: XChaCha20Poly1305::new(Key::from_slice(&value_key[..])),
        })
    }

    fn token(&self, key: &str) -> String {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(&self.token_key[..]), key.as_bytes());
        hex::encode(prk)
    }

    fn seal(&self, token: &str, entry: &PrefEntry) -> StorageResult<Vec<u8>> {
        let plaintext = Zeroizing::new(to_cbor(entry)?);
        let mut nonce = [0u8; VALUE_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .value_cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: token.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Crypto("preference encryption failed".to_string()))?;
        let mut sealed = Vec::with_capacity(VALUE_NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, token: &str, sealed: &[u8]) -> StorageResult<PrefEntry> {
        if sealed.len() < VALUE_NONCE_SIZE {
            return Err(StorageError::InvalidEnvelope(
                "preference value too short".to_string(),
            ));
        }
        let (nonce, ciphertext) = sealed.split_at(VALUE_NONCE_SIZE);
        let plaintext = Zeroizing::new(
            self.value_cipher
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: token.as_bytes(),
                    },
                )
                .map_err(|_| {
                    StorageError::Crypto("preference value failed authentication".to_string())
                })?,
        );
        from_cbor(&plaintext)
    }
}

struct PrefsState {
    envelope: KeyEnvelope,
    keys: Arc<PrefsKeys>,
    entries: BTreeMap<String, Vec<u8>>,
}

impl PrefsState {
    fn create(label: &str, master_key: &MasterKey) -> StorageResult<Self> {
        let data_key = DataKey::generate();
        Ok(Self {
            envelope: master_key.wrap_key(label, &data_key)?,
            keys: Arc::new(PrefsKeys::derive(&data_key)?),
            entries: BTreeMap::new(),
        })
    }

    fn load(label: &str, master_key: &MasterKey, file: PrefsFile) -> StorageResult<Self> {
        let data_key = master_key.unwrap_key(label, &file.key)?;
        Ok(Self {
            envelope: file.key,
            keys: Arc::new(PrefsKeys::derive(&data_key)?),
            entries: file.entries,
        })
    }
}

fn decode_file(bytes: &[u8]) -> StorageResult<PrefsFile> {
    let file: PrefsFile = from_cbor(bytes)?;
    if file.version != PREFS_VERSION {
        return Err(StorageError::UnsupportedVersion(file.version));
    }
    Ok(file)
}

/// A named namespace of encrypted preferences.
///
/// Reads decrypt on demand from the in-memory copy of the namespace; writes
/// go through an [`Editor`] and replace the persisted blob atomically.
///
/// Every commit re-reads the persisted blob first and applies its changes on
/// top, so several handles on one namespace keep each other's committed keys.
/// Reads of a handle only see other handles' commits after its own next
/// commit or a reopen. Commits are serialized per handle, not across handles.
pub struct EncryptedPreferences {
    name: String,
    label: String,
    blob_store: Arc<dyn AtomicBlobStore>,
    master_key: MasterKey,
    state: Mutex<PrefsState>,
}

impl std::fmt::Debug for EncryptedPreferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPreferences")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl EncryptedPreferences {
    /// Opens the namespace `name`, creating an empty one in memory if the
    /// blob store has none yet. Nothing is written until the first commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted namespace cannot be read, has an
    /// unsupported version, or its data key cannot be unwrapped.
    pub fn open(
        blob_store: Arc<dyn AtomicBlobStore>,
        name: impl Into<String>,
        master_key: &MasterKey,
    ) -> StorageResult<Self> {
        let name = name.into();
        let label = format!("prefs:{name}");

        let state = blob_store.read(&name)?.map_or_else(
            || PrefsState::create(&label, master_key),
            |bytes| PrefsState::load(&label, master_key, decode_file(&bytes)?),
        )?;
        log::debug!(
            "opened preferences {name} with {} entries",
            state.entries.len()
        );

        Ok(Self {
            name,
            label,
            blob_store,
            master_key: master_key.clone(),
            state: Mutex::new(state),
        })
    }

    /// Deletes the persisted namespace and opens an empty one under a new
    /// data key.
    ///
    /// This is the way out when the namespace can no longer be opened, e.g.
    /// after the master key was lost. Every stored value is gone afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be deleted or the new data key
    /// cannot be wrapped.
    pub fn reset(
        blob_store: Arc<dyn AtomicBlobStore>,
        name: impl Into<String>,
        master_key: &MasterKey,
    ) -> StorageResult<Self> {
        let name = name.into();
        blob_store.delete(&name)?;
        log::warn!("discarded preferences {name}");
        Self::open(blob_store, name, master_key)
    }

    /// Returns the namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_state(&self) -> StorageResult<MutexGuard<'_, PrefsState>> {
        self.state
            .lock()
            .map_err(|_| StorageError::BlobStore(format!("{} lock poisoned", self.name)))
    }

    /// Looks up the sealed entry of `key` without holding the lock afterwards.
    fn sealed_entry(&self, key: &str) -> StorageResult<(Arc<PrefsKeys>, String, Option<Vec<u8>>)> {
        let state = self.lock_state()?;
        let token = state.keys.token(key);
        let sealed = state.entries.get(&token).cloned();
        Ok((Arc::clone(&state.keys), token, sealed))
    }

    fn get_value(&self, key: &str) -> StorageResult<Option<PrefValue>> {
        let (keys, token, sealed) = self.sealed_entry(key)?;
        let Some(sealed) = sealed else {
            return Ok(None);
        };
        let entry = keys.open(&token, &sealed)?;
        if entry.key != key {
            return Err(StorageError::Crypto(format!(
                "entry stored under the token of '{key}' belongs to another key"
            )));
        }
        Ok(Some(entry.value))
    }

    /// Reads a string value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if the key holds another type,
    /// or a crypto error if the value fails authentication.
    pub fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(PrefValue::String(value)) => Ok(Some(value)),
            Some(other) => Err(type_mismatch(key, "string", &other)),
        }
    }

    /// Reads a boolean value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if the key holds another type,
    /// or a crypto error if the value fails authentication.
    pub fn get_bool(&self, key: &str) -> StorageResult<Option<bool>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(PrefValue::Bool(value)) => Ok(Some(value)),
            Some(other) => Err(type_mismatch(key, "bool", &other)),
        }
    }

    /// Reads an integer value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if the key holds another type,
    /// or a crypto error if the value fails authentication.
    pub fn get_int(&self, key: &str) -> StorageResult<Option<i64>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(PrefValue::Int(value)) => Ok(Some(value)),
            Some(other) => Err(type_mismatch(key, "int", &other)),
        }
    }

    /// Returns whether `key` has a value. Does not decrypt it.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace lock is poisoned.
    pub fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.sealed_entry(key)?.2.is_some())
    }

    /// Decrypts every entry of the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry fails authentication.
    pub fn get_all(&self) -> StorageResult<BTreeMap<String, PrefValue>> {
        let (keys, entries) = {
            let state = self.lock_state()?;
            (Arc::clone(&state.keys), state.entries.clone())
        };
        entries
            .iter()
            .map(|(token, sealed)| {
                let entry = keys.open(token, sealed)?;
                if keys.token(&entry.key) != *token {
                    return Err(StorageError::Crypto(
                        "entry does not match its token".to_string(),
                    ));
                }
                Ok((entry.key, entry.value))
            })
            .collect()
    }

    /// Starts a batch of changes.
    pub const fn edit(&self) -> Editor<'_> {
        Editor {
            prefs: self,
            clear: false,
            changes: BTreeMap::new(),
        }
    }

    // The lock spans the read-modify-write of the blob.
    #[allow(clippy::significant_drop_tightening)]
    fn persist(
        &self,
        clear: bool,
        changes: BTreeMap<String, Option<PrefValue>>,
    ) -> StorageResult<()> {
        let mut state = self.lock_state()?;

        // Start from what is persisted now, which may include commits of
        // other handles or a reset under a new data key.
        let PrefsState {
            envelope,
            keys,
            mut entries,
        } = match self.blob_store.read(&self.name)? {
            Some(bytes) => {
                let file = decode_file(&bytes)?;
                if file.key == state.envelope {
                    PrefsState {
                        envelope: file.key,
                        keys: Arc::clone(&state.keys),
                        entries: file.entries,
                    }
                } else {
                    log::debug!("preferences {} were rekeyed by another handle", self.name);
                    PrefsState::load(&self.label, &self.master_key, file)?
                }
            }
            None => PrefsState {
                envelope: state.envelope.clone(),
                keys: Arc::clone(&state.keys),
                entries: BTreeMap::new(),
            },
        };

        if clear {
            entries.clear();
        }
        for (key, change) in changes {
            let token = keys.token(&key);
            match change {
                Some(value) => {
                    let sealed = keys.seal(&token, &PrefEntry { key, value })?;
                    entries.insert(token, sealed);
                }
                None => {
                    entries.remove(&token);
                }
            }
        }

        let file = PrefsFile {
            version: PREFS_VERSION,
            key: envelope,
            entries,
        };
        self.blob_store.write_atomic(&self.name, &to_cbor(&file)?)?;
        log::debug!(
            "committed preferences {} ({} entries)",
            self.name,
            file.entries.len()
        );
        *state = PrefsState {
            envelope: file.key,
            keys,
            entries: file.entries,
        };
        Ok(())
    }
}

fn type_mismatch(key: &str, wanted: &str, found: &PrefValue) -> StorageError {
    StorageError::InvalidInput(format!(
        "preference '{key}' holds a {}, not a {wanted}",
        found.kind()
    ))
}

/// Batch of preference changes returned by [`EncryptedPreferences::edit`].
///
/// [`Editor::clear`] applies before every put and remove of the same batch,
/// whatever order they were made in. Later changes to a key replace earlier
/// ones.
#[must_use = "changes are discarded unless committed or applied"]
pub struct Editor<'a> {
    prefs: &'a EncryptedPreferences,
    clear: bool,
    changes: BTreeMap<String, Option<PrefValue>>,
}

impl Editor<'_> {
    /// Sets a string value.
    pub fn put_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.changes
            .insert(key.into(), Some(PrefValue::String(value.into())));
        self
    }

    /// Sets a boolean value.
    pub fn put_bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.changes.insert(key.into(), Some(PrefValue::Bool(value)));
        self
    }

    /// Sets an integer value.
    pub fn put_int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.changes.insert(key.into(), Some(PrefValue::Int(value)));
        self
    }

    /// Removes a key.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.changes.insert(key.into(), None);
        self
    }

    /// Removes every key of the namespace.
    pub const fn clear(mut self) -> Self {
        self.clear = true;
        self
    }

    /// Persists the batch atomically.
    ///
    /// On failure neither the persisted blob nor the in-memory view changes.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be sealed or the blob write fails.
    pub fn commit(self) -> StorageResult<()> {
        self.prefs.persist(self.clear, self.changes)
    }

    /// Persists the batch, logging instead of returning a failure.
    pub fn apply(self) {
        let name = self.prefs.name.clone();
        if let Err(err) = self.commit() {
            log::error!("failed to apply preferences {name}: {err}");
        }
    }
}
