//! Headless controller for the two-field secret screen.
//!
//! The screen has one field per backend. Each field shows a [`DisplayState`]
//! and a show/hide toggle, and supports three actions: submit, toggle
//! visibility and delete. Every action that the user sees a message for
//! returns a [`StatusMessage`].

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::SecretKitConfig;
use crate::error::StorageResult;
use crate::secret_store::{FileSecretStore, PrefsSecretStore, SecretStore};
use crate::storage::{DeviceKeystore, MasterKey, StoragePaths};

/// One of the two secret fields on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum SecretField {
    /// Backed by the encrypted preferences store.
    Preferences,
    /// Backed by the encrypted file store.
    File,
}

/// What a field currently shows.
#[derive(Debug)]
pub enum DisplayState {
    /// Nothing saved.
    Blank,
    /// A secret is saved but masked.
    Hidden,
    /// The saved secret, in clear.
    Revealed(SecretString),
}

impl DisplayState {
    /// Returns whether the field shows nothing.
    #[must_use]
    pub const fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    /// Returns the revealed secret, if any.
    #[must_use]
    pub const fn revealed(&self) -> Option<&SecretString> {
        match self {
            Self::Revealed(secret) => Some(secret),
            Self::Blank | Self::Hidden => None,
        }
    }
}

/// Label of a field's visibility toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VisibilityLabel {
    /// Pressing the toggle reveals the secret.
    Show,
    /// Pressing the toggle masks the secret.
    Hide,
}

/// Transient message shown after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StatusMessage {
    /// The secret was saved.
    #[strum(to_string = "Password saved successfully!")]
    Saved,
    /// The submitted input was blank.
    #[strum(to_string = "Your input is invalid, please try again!")]
    InvalidInput,
    /// There is no secret to show or delete.
    #[strum(to_string = "Password is not set!")]
    NotSet,
    /// The secret was deleted.
    #[strum(to_string = "Password deleted successfully!")]
    Deleted,
    /// A secret is stored but could not be decrypted.
    #[strum(to_string = "Password could not be read!")]
    ReadFailed,
}

/// Display state and toggle label of one field.
#[derive(Debug)]
pub struct FieldView {
    /// What the field shows.
    pub display: DisplayState,
    /// Label of the visibility toggle.
    pub toggle: VisibilityLabel,
}

impl Default for FieldView {
    fn default() -> Self {
        Self {
            display: DisplayState::Blank,
            toggle: VisibilityLabel::Show,
        }
    }
}

/// View model of the secret screen.
///
/// Owns one master key and one store per backend, all created on first use.
pub struct SecretScreen {
    paths: StoragePaths,
    config: SecretKitConfig,
    keystore: Arc<dyn DeviceKeystore>,
    master_key: Option<MasterKey>,
    file_store: Option<FileSecretStore>,
    prefs_store: Option<PrefsSecretStore>,
    file_view: FieldView,
    prefs_view: FieldView,
}

impl std::fmt::Debug for SecretScreen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretScreen")
            .field("paths", &self.paths)
            .field("file_view", &self.file_view)
            .field("prefs_view", &self.prefs_view)
            .finish_non_exhaustive()
    }
}

impl SecretScreen {
    /// Creates the controller. Nothing is read until [`Self::load`].
    #[must_use]
    pub fn new(
        paths: StoragePaths,
        config: SecretKitConfig,
        keystore: Arc<dyn DeviceKeystore>,
    ) -> Self {
        Self {
            paths,
            config,
            keystore,
            master_key: None,
            file_store: None,
            prefs_store: None,
            file_view: FieldView::default(),
            prefs_view: FieldView::default(),
        }
    }

    /// Returns the current view of `field`.
    #[must_use]
    pub const fn view(&self, field: SecretField) -> &FieldView {
        match field {
            SecretField::File => &self.file_view,
            SecretField::Preferences => &self.prefs_view,
        }
    }

    const fn view_mut(&mut self, field: SecretField) -> &mut FieldView {
        match field {
            SecretField::File => &mut self.file_view,
            SecretField::Preferences => &mut self.prefs_view,
        }
    }

    fn master_key(&mut self) -> StorageResult<MasterKey> {
        if let Some(master_key) = &self.master_key {
            return Ok(master_key.clone());
        }
        let master_key = MasterKey::builder(self.keystore.clone())
            .alias(self.config.master_key_alias.clone())
            .build()?;
        self.master_key = Some(master_key.clone());
        Ok(master_key)
    }

    fn file_store(&mut self) -> StorageResult<&FileSecretStore> {
        if let Some(store) = self.file_store.take() {
            return Ok(&*self.file_store.insert(store));
        }
        let master_key = self.master_key()?;
        let store = FileSecretStore::new(&self.paths, &self.config, master_key)?;
        Ok(&*self.file_store.insert(store))
    }

    fn prefs_store(&mut self) -> StorageResult<&PrefsSecretStore> {
        if let Some(store) = self.prefs_store.take() {
            return Ok(&*self.prefs_store.insert(store));
        }
        let master_key = self.master_key()?;
        let store = PrefsSecretStore::open(&self.paths, &self.config, &master_key)?;
        Ok(&*self.prefs_store.insert(store))
    }

    fn store(&mut self, field: SecretField) -> StorageResult<&dyn SecretStore> {
        let store: &dyn SecretStore = match field {
            SecretField::File => self.file_store()?,
            SecretField::Preferences => self.prefs_store()?,
        };
        Ok(store)
    }

    /// Like [`Self::store`], but a preferences namespace that cannot be opened
    /// with the current master key is reset so a new secret can be saved.
    fn writable_store(&mut self, field: SecretField) -> StorageResult<&dyn SecretStore> {
        if field == SecretField::Preferences && self.prefs_store.is_none() {
            let master_key = self.master_key()?;
            let store = PrefsSecretStore::open_or_reset(&self.paths, &self.config, &master_key)?;
            self.prefs_store = Some(store);
        }
        self.store(field)
    }

    fn read(&mut self, field: SecretField) -> StorageResult<Option<SecretString>> {
        self.store(field)?.get()
    }

    /// Reads both stores and masks every field that has a secret.
    ///
    /// A field whose secret cannot be read is shown blank.
    pub fn load(&mut self) {
        for field in [SecretField::Preferences, SecretField::File] {
            let display = match self.read(field) {
                Ok(Some(_)) => DisplayState::Hidden,
                Ok(None) => DisplayState::Blank,
                Err(err) => {
                    log::warn!("failed to load {field} secret: {err}");
                    DisplayState::Blank
                }
            };
            let view = self.view_mut(field);
            view.display = display;
            view.toggle = VisibilityLabel::Show;
        }
    }

    /// Saves `input` into the store behind `field`.
    ///
    /// Blank input is rejected without touching the store. Saved preferences
    /// that can no longer be decrypted are discarded and replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the write fails.
    pub fn submit(&mut self, field: SecretField, input: &str) -> StorageResult<StatusMessage> {
        if input.trim().is_empty() {
            return Ok(StatusMessage::InvalidInput);
        }
        self.writable_store(field)?.save(input)?;
        let view = self.view_mut(field);
        view.display = DisplayState::Hidden;
        view.toggle = VisibilityLabel::Show;
        Ok(StatusMessage::Saved)
    }

    /// Reveals or masks the secret of `field`.
    ///
    /// Returns the message to show, if any. A secret that cannot be read
    /// clears the field and reports [`StatusMessage::ReadFailed`].
    pub fn toggle_visibility(&mut self, field: SecretField) -> Option<StatusMessage> {
        match self.view(field).toggle {
            VisibilityLabel::Hide => {
                let view = self.view_mut(field);
                view.display = DisplayState::Hidden;
                view.toggle = VisibilityLabel::Show;
                None
            }
            VisibilityLabel::Show => {
                if self.view(field).display.is_blank() {
                    return Some(StatusMessage::NotSet);
                }
                let message = match self.read(field) {
                    Ok(Some(secret)) => {
                        let view = self.view_mut(field);
                        view.display = DisplayState::Revealed(secret);
                        view.toggle = VisibilityLabel::Hide;
                        return None;
                    }
                    Ok(None) => StatusMessage::NotSet,
                    Err(err) => {
                        log::warn!("failed to reveal {field} secret: {err}");
                        StatusMessage::ReadFailed
                    }
                };
                *self.view_mut(field) = FieldView::default();
                Some(message)
            }
        }
    }

    /// Deletes the secret of `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the delete fails.
    pub fn delete(&mut self, field: SecretField) -> StorageResult<StatusMessage> {
        if self.view(field).display.is_blank() {
            return Ok(StatusMessage::NotSet);
        }
        self.store(field)?.delete()?;
        let view = self.view_mut(field);
        view.display = DisplayState::Blank;
        view.toggle = VisibilityLabel::Show;
        Ok(StatusMessage::Deleted)
    }
}
