//! Storage path helpers.

use std::path::{Path, PathBuf};

const FILES_DIRNAME: &str = "files";
const SHARED_PREFS_DIRNAME: &str = "shared_prefs";
const KEYSTORE_DIRNAME: &str = "keystore";

/// App-private storage layout under an explicit root.
///
/// ```text
/// <root>/files/         encrypted files (the secret file)
/// <root>/shared_prefs/  encrypted preference namespaces
/// <root>/keystore/      device key of the local keystore
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding encrypted files.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIRNAME)
    }

    /// Returns the directory holding preference namespaces.
    #[must_use]
    pub fn shared_prefs_dir(&self) -> PathBuf {
        self.root.join(SHARED_PREFS_DIRNAME)
    }

    /// Returns the directory of the file-backed local keystore.
    #[must_use]
    pub fn keystore_dir(&self) -> PathBuf {
        self.root.join(KEYSTORE_DIRNAME)
    }

    /// Returns the path of a named file inside [`Self::files_dir`].
    #[must_use]
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.files_dir().join(file_name)
    }
}
