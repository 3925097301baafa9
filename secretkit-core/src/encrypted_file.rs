//! Encrypted file provider.
//!
//! An [`EncryptedFile`] hands out streaming writers and readers that encrypt
//! and decrypt transparently. The on-disk layout is:
//!
//! ```text
//! magic "SKEF" (4) | header length u32 LE (4) | CBOR FileHeader | segment 0 | ...
//! ```
//!
//! The header carries the file's data key (wrapped by the master key, bound
//! to the file name), a random 32-byte salt and a random 19-byte nonce prefix.
//! Plaintext is cut into segments of [`SEGMENT_SIZE`] bytes and sealed with
//! the STREAM construction of the `aead` crate (big-endian 32-bit counter and
//! last-segment flag after the prefix) over XChaCha20-Poly1305:
//!
//! - key: HKDF-SHA256(data key, salt, info = file name)
//! - associated data: file name
//!
//! The last-segment flag makes truncation at a segment boundary fail
//! authentication, and an empty file still carries one (empty) final segment.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chacha20poly1305::{
    aead::{
        generic_array::GenericArray,
        stream::{DecryptorBE32, EncryptorBE32},
        KeyInit, Payload,
    },
    Key, XChaCha20Poly1305,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};
use crate::storage::envelope::{from_cbor, to_cbor, KeyEnvelope};
use crate::storage::{DataKey, MasterKey, DATA_KEY_SIZE};

const MAGIC: &[u8; 4] = b"SKEF";
const HEADER_VERSION: u32 = 1;
const MAX_HEADER_LEN: u32 = 16 * 1024;
const SALT_SIZE: usize = 32;
// XChaCha nonce (24) minus the STREAM counter (4) and last-segment flag (1).
const NONCE_PREFIX_SIZE: usize = 19;
const TAG_SIZE: usize = 16;

/// Plaintext bytes per sealed segment.
pub const SEGMENT_SIZE: usize = 4096;

/// Encryption scheme of an [`EncryptedFile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum FileEncryptionScheme {
    /// Streaming XChaCha20-Poly1305 with an HKDF-SHA256 derived key and 4 KiB segments.
    #[default]
    #[strum(to_string = "XCHACHA20POLY1305_HKDF_4KB")]
    XChaCha20Poly1305Hkdf4Kb,
}

#[derive(Serialize, Deserialize)]
struct FileHeader {
    version: u32,
    scheme: FileEncryptionScheme,
    key: KeyEnvelope,
    salt: Vec<u8>,
    nonce_prefix: Vec<u8>,
}

/// A file whose content is encrypted under a [`MasterKey`].
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    path: PathBuf,
    file_name: String,
    master_key: MasterKey,
    scheme: FileEncryptionScheme,
}

/// Builder returned by [`EncryptedFile::builder`].
#[derive(Debug)]
pub struct EncryptedFileBuilder {
    path: PathBuf,
    master_key: MasterKey,
    scheme: FileEncryptionScheme,
}

impl EncryptedFileBuilder {
    /// Selects the encryption scheme.
    #[must_use]
    pub const fn scheme(mut self, scheme: FileEncryptionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Finishes the encrypted file handle. Nothing is touched on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if the path has no UTF-8 file name.
    pub fn build(self) -> StorageResult<EncryptedFile> {
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                StorageError::InvalidInput(format!(
                    "encrypted file path '{}' has no UTF-8 file name",
                    self.path.display()
                ))
            })?
            .to_string();
        Ok(EncryptedFile {
            path: self.path,
            file_name,
            master_key: self.master_key,
            scheme: self.scheme,
        })
    }
}

impl EncryptedFile {
    /// Starts building an encrypted file at `path`.
    #[must_use]
    pub fn builder(path: impl Into<PathBuf>, master_key: MasterKey) -> EncryptedFileBuilder {
        EncryptedFileBuilder {
            path: path.into(),
            master_key,
            scheme: FileEncryptionScheme::default(),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the encryption scheme.
    #[must_use]
    pub const fn scheme(&self) -> FileEncryptionScheme {
        self.scheme
    }

    /// Returns whether the backing file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Opens an encrypted output stream to a new file.
    ///
    /// The file must not exist yet; delete it first to replace its content.
    /// Call [`EncryptedFileWriter::finish`] when done, a writer dropped
    /// without it leaves a file that fails to open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileExists`] if the file is already there, or an
    /// error if the file cannot be created or the data key cannot be wrapped.
    pub fn open_file_output(&self) -> StorageResult<EncryptedFileWriter<File>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::io(
                    format!("failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    StorageError::FileExists(self.path.display().to_string())
                } else {
                    StorageError::io(format!("failed to create '{}'", self.path.display()), e)
                }
            })?;
        log::debug!("opened encrypted output {}", self.path.display());
        EncryptedFileWriter::create(file, &self.master_key, &self.file_name, self.scheme)
            .inspect_err(|_| {
                // Without a header the file could never be opened again.
                if let Err(e) = fs::remove_file(&self.path) {
                    log::warn!("failed to remove {}: {e}", self.path.display());
                }
            })
    }

    /// Opens an encrypted input stream over the existing file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error (kind `NotFound` for a missing file) or a format,
    /// key or authentication error if the header cannot be opened.
    pub fn open_file_input(&self) -> StorageResult<EncryptedFileReader<File>> {
        let file = File::open(&self.path).map_err(|e| {
            StorageError::io(format!("failed to open '{}'", self.path.display()), e)
        })?;
        EncryptedFileReader::open(file, &self.master_key, &self.file_name)
    }
}

/// Streaming encryptor returned by [`EncryptedFile::open_file_output`].
pub struct EncryptedFileWriter<W: Write> {
    inner: W,
    encryptor: EncryptorBE32<XChaCha20Poly1305>,
    file_name: String,
    buffer: Zeroizing<Vec<u8>>,
}

impl<W: Write> EncryptedFileWriter<W> {
    /// Writes the header to `inner` and prepares segment encryption.
    pub(crate) fn create(
        mut inner: W,
        master_key: &MasterKey,
        file_name: &str,
        scheme: FileEncryptionScheme,
    ) -> StorageResult<Self> {
        let data_key = DataKey::generate();
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        OsRng.fill_bytes(&mut nonce_prefix);

        let header = FileHeader {
            version: HEADER_VERSION,
            scheme,
            key: master_key.wrap_key(&key_label(file_name), &data_key)?,
            salt: salt.to_vec(),
            nonce_prefix: nonce_prefix.to_vec(),
        };
        let header_bytes = to_cbor(&header)?;
        let header_len = u32::try_from(header_bytes.len())
            .map_err(|_| StorageError::Serialization("file header too large".to_string()))?;

        inner
            .write_all(MAGIC)
            .and_then(|()| inner.write_all(&header_len.to_le_bytes()))
            .and_then(|()| inner.write_all(&header_bytes))
            .map_err(|e| StorageError::io("failed to write encrypted file header", e))?;

        let cipher = segment_cipher(&data_key, &salt, file_name.as_bytes())?;
        Ok(Self {
            inner,
            encryptor: EncryptorBE32::from_aead(cipher, GenericArray::from_slice(&nonce_prefix)),
            file_name: file_name.to_string(),
            buffer: Zeroizing::new(Vec::with_capacity(SEGMENT_SIZE)),
        })
    }

    fn write_segment(&mut self, plaintext: &[u8]) -> StorageResult<()> {
        let ciphertext = self
            .encryptor
            .encrypt_next(Payload {
                msg: plaintext,
                aad: self.file_name.as_bytes(),
            })
            .map_err(|_| StorageError::Crypto("segment encryption failed".to_string()))?;
        self.inner
            .write_all(&ciphertext)
            .map_err(|e| StorageError::io("failed to write encrypted segment", e))
    }

    /// Seals the final segment, flushes, and returns the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final segment cannot be sealed or written.
    pub fn finish(self) -> StorageResult<W> {
        let Self {
            mut inner,
            encryptor,
            file_name,
            buffer,
        } = self;
        let ciphertext = encryptor
            .encrypt_last(Payload {
                msg: &buffer[..],
                aad: file_name.as_bytes(),
            })
            .map_err(|_| StorageError::Crypto("segment encryption failed".to_string()))?;
        inner
            .write_all(&ciphertext)
            .and_then(|()| inner.flush())
            .map_err(|e| StorageError::io("failed to finish encrypted file", e))?;
        Ok(inner)
    }
}

impl<W: Write> Write for EncryptedFileWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        // A full segment is only sealed once more data follows it, so the
        // final segment is always the one sealed by `finish`.
        while self.buffer.len() > SEGMENT_SIZE {
            let segment: Zeroizing<Vec<u8>> =
                Zeroizing::new(self.buffer.drain(..SEGMENT_SIZE).collect());
            self.write_segment(&segment).map_err(StorageError::into_io)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming decryptor returned by [`EncryptedFile::open_file_input`].
pub struct EncryptedFileReader<R: Read> {
    inner: R,
    // None once the last segment has been opened.
    decryptor: Option<DecryptorBE32<XChaCha20Poly1305>>,
    file_name: String,
    lookahead: Vec<u8>,
    plaintext: Zeroizing<Vec<u8>>,
    position: usize,
}

impl<R: Read> EncryptedFileReader<R> {
    /// Parses the header from `inner` and unwraps the data key.
    pub(crate) fn open(
        mut inner: R,
        master_key: &MasterKey,
        file_name: &str,
    ) -> StorageResult<Self> {
        let mut magic = [0u8; MAGIC.len()];
        read_exact_or(&mut inner, &mut magic, file_name)?;
        if &magic != MAGIC {
            return Err(StorageError::InvalidMagic(file_name.to_string()));
        }

        let mut len_bytes = [0u8; 4];
        read_exact_or(&mut inner, &mut len_bytes, file_name)?;
        let header_len = u32::from_le_bytes(len_bytes);
        if header_len == 0 || header_len > MAX_HEADER_LEN {
            return Err(StorageError::InvalidEnvelope(format!(
                "implausible header length {header_len}"
            )));
        }
        let mut header_bytes = vec![0u8; header_len as usize];
        read_exact_or(&mut inner, &mut header_bytes, file_name)?;
        let header: FileHeader = from_cbor(&header_bytes)?;

        if header.version != HEADER_VERSION {
            return Err(StorageError::UnsupportedVersion(header.version));
        }
        let salt: [u8; SALT_SIZE] = header.salt.as_slice().try_into().map_err(|_| {
            StorageError::InvalidEnvelope(format!("salt must be {SALT_SIZE} bytes"))
        })?;
        let nonce_prefix: [u8; NONCE_PREFIX_SIZE] =
            header.nonce_prefix.as_slice().try_into().map_err(|_| {
                StorageError::InvalidEnvelope(format!(
                    "nonce prefix must be {NONCE_PREFIX_SIZE} bytes"
                ))
            })?;

        let data_key = master_key.unwrap_key(&key_label(file_name), &header.key)?;
        let cipher = segment_cipher(&data_key, &salt, file_name.as_bytes())?;

        let lookahead = read_chunk(&mut inner)?;
        if lookahead.is_empty() {
            return Err(StorageError::Truncated(file_name.to_string()));
        }

        Ok(Self {
            inner,
            decryptor: Some(DecryptorBE32::from_aead(
                cipher,
                GenericArray::from_slice(&nonce_prefix),
            )),
            file_name: file_name.to_string(),
            lookahead,
            plaintext: Zeroizing::new(Vec::new()),
            position: 0,
        })
    }

    fn next_segment(&mut self) -> StorageResult<()> {
        let current = std::mem::take(&mut self.lookahead);
        if current.is_empty() {
            return Err(StorageError::Truncated(self.file_name.clone()));
        }
        self.lookahead = read_chunk(&mut self.inner)?;

        let payload = Payload {
            msg: &current,
            aad: self.file_name.as_bytes(),
        };
        // Only an empty lookahead marks `current` as the final segment.
        let opened = if self.lookahead.is_empty() {
            self.decryptor
                .take()
                .ok_or_else(|| StorageError::Truncated(self.file_name.clone()))?
                .decrypt_last(payload)
        } else {
            self.decryptor
                .as_mut()
                .ok_or_else(|| StorageError::Truncated(self.file_name.clone()))?
                .decrypt_next(payload)
        };
        let plaintext = opened.map_err(|_| {
            StorageError::Crypto(format!(
                "segment of '{}' failed authentication",
                self.file_name
            ))
        })?;

        self.plaintext = Zeroizing::new(plaintext);
        self.position = 0;
        Ok(())
    }
}

impl<R: Read> Read for EncryptedFileReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let available = &self.plaintext[self.position..];
            if !available.is_empty() {
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.position += n;
                return Ok(n);
            }
            if self.decryptor.is_none() {
                return Ok(0);
            }
            self.next_segment().map_err(StorageError::into_io)?;
        }
    }
}

fn key_label(file_name: &str) -> String {
    format!("file:{file_name}")
}

fn segment_cipher(
    data_key: &DataKey,
    salt: &[u8],
    info: &[u8],
) -> StorageResult<XChaCha20Poly1305> {
    let hk = Hkdf::<Sha256>::new(Some(salt), data_key.as_bytes());
    let mut okm = Zeroizing::new([0u8; DATA_KEY_SIZE]);
    hk.expand(info, &mut okm[..])
        .map_err(|err| StorageError::Crypto(err.to_string()))?;
    Ok(XChaCha20Poly1305::new(Key::from_slice(&okm[..])))
}

fn read_exact_or<R: Read>(inner: &mut R, buf: &mut [u8], file_name: &str) -> StorageResult<()> {
    inner.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StorageError::Truncated(file_name.to_string())
        } else {
            StorageError::io(format!("failed to read header of '{file_name}'"), e)
        }
    })
}

/// Reads one ciphertext segment, or fewer bytes at end of input.
fn read_chunk<R: Read>(inner: &mut R) -> StorageResult<Vec<u8>> {
    let mut chunk = vec![0u8; SEGMENT_SIZE + TAG_SIZE];
    let mut filled = 0;
    while filled < chunk.len() {
        match inner.read(&mut chunk[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(StorageError::io("failed to read encrypted segment", e)),
        }
    }
    chunk.truncate(filled);
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn encrypt(master_key: &MasterKey, name: &str, plaintext: &[u8]) -> Vec<u8> {
        let mut writer = EncryptedFileWriter::create(
            Vec::new(),
            master_key,
            name,
            FileEncryptionScheme::default(),
        )
        .expect("create");
        writer.write_all(plaintext).expect("write");
        writer.finish().expect("finish")
    }

    fn decrypt(master_key: &MasterKey, name: &str, bytes: &[u8]) -> StorageResult<Vec<u8>> {
        let mut reader = EncryptedFileReader::open(bytes, master_key, name)?;
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .map_err(|e| StorageError::from_io("read", e))?;
        Ok(out)
    }

    #[test_case(0 ; "empty")]
    #[test_case(7 ; "short")]
    #[test_case(SEGMENT_SIZE ; "exactly one segment")]
    #[test_case(SEGMENT_SIZE + 1 ; "one byte into second segment")]
    #[test_case(3 * SEGMENT_SIZE + 123 ; "several segments")]
    fn test_stream_round_trip(len: usize) {
        let master_key = MasterKey::generate();
        #[allow(clippy::cast_possible_truncation)]
        let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let bytes = encrypt(&master_key, "secret_file.txt", &plaintext);
        assert_eq!(
            decrypt(&master_key, "secret_file.txt", &bytes).expect("decrypt"),
            plaintext
        );
    }

    #[test]
    fn test_segments_have_fixed_ciphertext_size() {
        let master_key = MasterKey::generate();
        let plain = encrypt(&master_key, "secret_file.txt", &[]);
        let header_and_tag = plain.len();
        let full = encrypt(&master_key, "secret_file.txt", &[7u8; 2 * SEGMENT_SIZE + 5]);
        assert_eq!(
            full.len(),
            header_and_tag + 2 * (SEGMENT_SIZE + TAG_SIZE) + 5
        );
    }

    #[test]
    fn test_ciphertext_hides_plaintext() {
        let master_key = MasterKey::generate();
        let bytes = encrypt(&master_key, "secret_file.txt", b"hunter2hunter2");
        assert!(!bytes.windows(7).any(|window| window == b"hunter2"));
    }

    #[test]
    fn test_file_name_is_bound() {
        let master_key = MasterKey::generate();
        let bytes = encrypt(&master_key, "secret_file.txt", b"hunter2");
        assert!(decrypt(&master_key, "renamed.txt", &bytes).is_err());
    }

    #[test]
    fn test_tampered_segment_fails() {
        let master_key = MasterKey::generate();
        let mut bytes = encrypt(&master_key, "secret_file.txt", b"hunter2");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decrypt(&master_key, "secret_file.txt", &bytes),
            Err(StorageError::Crypto(_))
        ));
    }

    #[test]
    fn test_truncation_at_segment_boundary_fails() {
        let master_key = MasterKey::generate();
        let plaintext = vec![0x42u8; 2 * SEGMENT_SIZE + 10];
        let bytes = encrypt(&master_key, "secret_file.txt", &plaintext);
        let cut = bytes.len() - (10 + TAG_SIZE);
        assert!(matches!(
            decrypt(&master_key, "secret_file.txt", &bytes[..cut]),
            Err(StorageError::Crypto(_))
        ));
    }

    #[test]
    fn test_header_only_is_truncated() {
        let master_key = MasterKey::generate();
        let bytes = encrypt(&master_key, "secret_file.txt", b"");
        let cut = bytes.len() - TAG_SIZE;
        assert!(matches!(
            decrypt(&master_key, "secret_file.txt", &bytes[..cut]),
            Err(StorageError::Truncated(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let master_key = MasterKey::generate();
        assert!(matches!(
            decrypt(&master_key, "secret_file.txt", b"PLAINTEXT PASSWORD"),
            Err(StorageError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_other_master_key_cannot_open() {
        let bytes = encrypt(&MasterKey::generate(), "secret_file.txt", b"hunter2");
        assert!(matches!(
            decrypt(&MasterKey::generate(), "secret_file.txt", &bytes),
            Err(StorageError::Crypto(_))
        ));
    }

    #[test]
    fn test_output_refuses_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secret_file.txt");
        let file = EncryptedFile::builder(path, MasterKey::generate())
            .build()
            .expect("build");

        file.open_file_output()
            .expect("open output")
            .finish()
            .expect("finish");
        assert!(file.exists());
        assert!(matches!(
            file.open_file_output(),
            Err(StorageError::FileExists(_))
        ));
    }

    #[test]
    fn test_file_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("files").join("secret_file.txt");
        let file = EncryptedFile::builder(path, MasterKey::generate())
            .scheme(FileEncryptionScheme::XChaCha20Poly1305Hkdf4Kb)
            .build()
            .expect("build");
        assert_eq!(file.scheme().to_string(), "XCHACHA20POLY1305_HKDF_4KB");

        let mut writer = file.open_file_output().expect("open output");
        writer.write_all("pässwörd".as_bytes()).expect("write");
        writer.flush().expect("flush");
        writer.finish().expect("finish");

        let mut text = String::new();
        file.open_file_input()
            .expect("open input")
            .read_to_string(&mut text)
            .expect("read");
        assert_eq!(text, "pässwörd");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.txt");
        let file = EncryptedFile::builder(path, MasterKey::generate())
            .build()
            .expect("build");
        match file.open_file_input() {
            Err(StorageError::Io { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_path_without_file_name_rejected() {
        assert!(matches!(
            EncryptedFile::builder("/", MasterKey::generate()).build(),
            Err(StorageError::InvalidInput(_))
        ));
    }
}
