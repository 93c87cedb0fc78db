use cask_crypto::{EncryptionAlgorithm, EncryptionKey};
use serde::{Deserialize, Serialize};

use crate::error::{BlobError, BlobResult};

bitflags::bitflags! {
    /// Flags controlling how a store directory is opened.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct StoreFlags: u32 {
        /// Create the directory tree if it does not exist.
        const CREATE = 0x01;
        /// Reject every mutating operation.
        const READ_ONLY = 0x02;
    }
}

/// Configuration for opening a [`BlobStore`](crate::BlobStore).
///
/// Serializable so hosts can keep it alongside their own settings; the
/// encryption key is never serialized and must be attached with
/// [`StoreOptions::with_encryption_key`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub flags: StoreFlags,
    pub encryption: EncryptionAlgorithm,
    #[serde(skip)]
    pub encryption_key: Option<EncryptionKey>,
    /// `fsync` each blob file before it is renamed into place, then the
    /// store directory after the rename.
    pub sync_on_install: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            flags: StoreFlags::CREATE,
            encryption: EncryptionAlgorithm::None,
            encryption_key: None,
            sync_on_install: true,
        }
    }
}

impl StoreOptions {
    /// Options for attaching to an existing store without modifying it.
    pub fn read_only() -> Self {
        Self {
            flags: StoreFlags::READ_ONLY,
            ..Self::default()
        }
    }

    /// Replace the open flags.
    pub fn with_flags(mut self, flags: StoreFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Encrypt blobs at rest with `key`.
    pub fn with_encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption = EncryptionAlgorithm::ChaCha20Blake3;
        self.encryption_key = Some(key);
        self
    }

    /// Parse options from a TOML fragment such as:
    ///
    /// ```toml
    /// flags = "CREATE"
    /// sync_on_install = false
    /// ```
    pub fn from_toml_str(s: &str) -> BlobResult<Self> {
        toml::from_str(s).map_err(|e| BlobError::Config(e.to_string()))
    }

    /// Whether `READ_ONLY` is set.
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(StoreFlags::READ_ONLY)
    }

    /// Whether `CREATE` is set.
    pub fn creates(&self) -> bool {
        self.flags.contains(StoreFlags::CREATE)
    }

    pub(crate) fn validate(&self) -> BlobResult<()> {
        if self.creates() && self.is_read_only() {
            return Err(BlobError::InvalidArgument(
                "CREATE and READ_ONLY cannot be combined".into(),
            ));
        }
        match (self.encryption, &self.encryption_key) {
            (EncryptionAlgorithm::None, None) | (EncryptionAlgorithm::ChaCha20Blake3, Some(_)) => {
                Ok(())
            }
            (EncryptionAlgorithm::None, Some(_)) => Err(BlobError::Config(
                "encryption key supplied but encryption is disabled".into(),
            )),
            (EncryptionAlgorithm::ChaCha20Blake3, None) => Err(BlobError::Config(
                "encryption enabled but no key supplied".into(),
            )),
        }
    }
}
