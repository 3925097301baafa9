#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Encrypted on-device persistence for a single secret string.
//!
//! Two interchangeable backends implement [`SecretStore`]:
//!
//! - [`FileSecretStore`] keeps the secret as the plaintext of one
//!   [`EncryptedFile`](encrypted_file::EncryptedFile).
//! - [`PrefsSecretStore`] keeps it under one key of an
//!   [`EncryptedPreferences`](encrypted_prefs::EncryptedPreferences) namespace.
//!
//! Both are keyed by a [`MasterKey`] held in a [`DeviceKeystore`].
//! [`SecretScreen`] drives them from a two-field screen.
//!
//! ```rust
//! use secrecy::ExposeSecret;
//! use secretkit_core::{FileSecretStore, MasterKey, SecretKitConfig, SecretStore, StoragePaths};
//!
//! let root = tempfile::tempdir().unwrap();
//! let store = FileSecretStore::new(
//!     &StoragePaths::new(root.path()),
//!     &SecretKitConfig::default(),
//!     MasterKey::generate(),
//! )
//! .unwrap();
//!
//! store.save("hunter2").unwrap();
//! assert_eq!(store.get().unwrap().unwrap().expose_secret(), "hunter2");
//! store.delete().unwrap();
//! assert!(store.get().unwrap().is_none());
//! ```

mod config;
pub use config::*;

mod error;
pub use error::*;

mod screen;
pub use screen::*;

mod secret_store;
pub use secret_store::*;

pub mod encrypted_file;
pub mod encrypted_prefs;

/// Log forwarding to a host-supplied [`Logger`](logger::Logger).
pub mod logger;

pub mod storage;
pub use storage::{
    AtomicBlobStore, DeviceKeystore, EphemeralKeystore, FsBlobStore, LocalKeystore, MasterKey,
    MasterKeyBuilder, StoragePaths,
};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("secretkit_core");
