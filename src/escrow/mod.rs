//! Content-addressed encrypted escrow of original slide data.
//!
//! Every pseudonymization escrows two documents per slide so the operation
//! stays reversible:
//!
//! - the *label-strip blob*: the original compressed strips plus the strip
//!   tables needed to put them back at their original offsets
//! - the *description blob*: one record per IFD whose `ImageDescription`
//!   was modified
//!
//! Blobs live in a single directory, each under a freshly generated random
//! 20-character file name (suffixed `_N` on collision). Contents are Fernet
//! tokens: AES-128-CBC with HMAC-SHA256 under a single URL-safe base64 key,
//! one fresh key per blob. Decryption fails closed: a wrong key or a
//! tampered ciphertext is rejected.

use std::path::{Path, PathBuf};

use fernet::Fernet;
use serde::{Deserialize, Serialize};

use crate::config::STORE_FILE_NAME_LENGTH;
use crate::error::EscrowError;
use crate::ids::generate_id;

// =============================================================================
// Blob documents
// =============================================================================

/// Escrowed label strip data.
///
/// `data` is the concatenation of the original compressed strips in
/// original order; the tables allow restoring the exact original bytes at
/// the original file offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBlob {
    /// Original strip byte counts (tag 279)
    pub data_byte_counts: Vec<u32>,

    /// Original strip offsets (tag 273)
    pub data_offsets: Vec<u32>,

    /// Original compression (tag 259)
    pub compression: u16,

    /// Concatenated original strip bytes
    pub data: Vec<u8>,
}

/// One escrowed `ImageDescription`, keyed by the IFD it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRecord {
    /// Index of the IFD in the file's IFD chain
    pub page_index: usize,

    /// Image shape `[height, width, samples]` at escrow time, checked
    /// against the file before restoring
    pub shape: [u32; 3],

    /// Original count field of tag 270
    pub count: u32,

    /// Original absolute offset of the description bytes
    pub value_offset: u32,

    /// Original description text
    pub value: String,
}

/// The description blob is the list of records for every modified IFD.
pub type DescriptionBlob = Vec<DescriptionRecord>;

// =============================================================================
// EscrowStore
// =============================================================================

/// A directory of encrypted escrow blobs.
#[derive(Debug, Clone)]
pub struct EscrowStore {
    dir: PathBuf,
}

impl EscrowStore {
    /// Open (and create if needed) an escrow store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EscrowError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(EscrowStore { dir })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of a blob name inside the store.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Encrypt and store a plaintext, returning `(name, key)`.
    pub async fn put(&self, plaintext: &[u8]) -> Result<(String, String), EscrowError> {
        let key = Fernet::generate_key();
        let fernet = Fernet::new(&key).ok_or(EscrowError::InvalidKey)?;
        let token = fernet.encrypt(plaintext);

        let (name, path) = self.allocate_name();
        tokio::fs::write(&path, token.as_bytes()).await?;

        Ok((name, key))
    }

    /// Fetch and decrypt a blob.
    ///
    /// Fails with `NotFound` when the name does not resolve and with
    /// `InvalidKey` when authentication fails.
    pub async fn get(&self, name: &str, key: &str) -> Result<Vec<u8>, EscrowError> {
        let path = self.path_of(name);
        let token = match tokio::fs::read_to_string(&path).await {
            Ok(token) => token,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EscrowError::NotFound(name.to_string()));
            }
            Err(e) => return Err(EscrowError::Io(e)),
        };

        let fernet = Fernet::new(key).ok_or(EscrowError::InvalidKey)?;
        fernet
            .decrypt(token.trim())
            .map_err(|_| EscrowError::InvalidKey)
    }

    /// Remove a blob; used when rolling back a failed slide.
    pub async fn remove(&self, name: &str) -> Result<(), EscrowError> {
        match tokio::fs::remove_file(self.path_of(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EscrowError::Io(e)),
        }
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    /// Store a label-strip blob.
    pub async fn put_label(&self, blob: &LabelBlob) -> Result<(String, String), EscrowError> {
        let plaintext = serde_json::to_vec(blob)?;
        self.put(&plaintext).await
    }

    /// Fetch a label-strip blob.
    pub async fn get_label(&self, name: &str, key: &str) -> Result<LabelBlob, EscrowError> {
        let plaintext = self.get(name, key).await?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Store a description blob.
    pub async fn put_descriptions(
        &self,
        blob: &DescriptionBlob,
    ) -> Result<(String, String), EscrowError> {
        let plaintext = serde_json::to_vec(blob)?;
        self.put(&plaintext).await
    }

    /// Fetch a description blob.
    pub async fn get_descriptions(
        &self,
        name: &str,
        key: &str,
    ) -> Result<DescriptionBlob, EscrowError> {
        let plaintext = self.get(name, key).await?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Generate a fresh blob name, suffixing `_N` while the name collides.
    fn allocate_name(&self) -> (String, PathBuf) {
        let base = generate_id(STORE_FILE_NAME_LENGTH);
        let mut name = base.clone();
        let mut counter = 0u32;

        while self.path_of(&name).exists() {
            counter += 1;
            name = format!("{base}_{counter}");
        }

        let path = self.path_of(&name);
        (name, path)
    }
}

// =============================================================================
// Tests
// =============================================================================
