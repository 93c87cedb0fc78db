use std::path::PathBuf;

use cask_crypto::{CryptoError, EncryptionAlgorithm};
use cask_types::{BlobKey, ErrorKind};

use crate::store::BlobStore;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No blob with this key exists in the store.
    #[error("blob not found: {0}")]
    NotFound(BlobKey),

    /// The store directory does not exist and creation was not requested.
    #[error("blob store directory not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Options could not be parsed or are inconsistent.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// The store directory was written with a different encryption setting
    /// than the one it is being opened with.
    #[error("store holds {stored:?} blobs but was opened for {requested:?}")]
    EncryptionMismatch {
        stored: EncryptionAlgorithm,
        requested: EncryptionAlgorithm,
    },

    /// The store's manifest file is unreadable or from a newer format.
    #[error("bad store manifest: {0}")]
    Manifest(String),

    /// A mutating operation was attempted on a read-only store.
    #[error("blob store is read-only")]
    ReadOnly,

    /// The blob is encrypted, so its file is unreadable to the caller.
    #[error("blob {0} is encrypted; read it through the store instead")]
    Encrypted(BlobKey),

    /// Something other than a regular file occupies the blob's path.
    #[error("blob {0} is not stored as a standalone file")]
    NotStandaloneFile(BlobKey),

    /// Stored data failed an integrity check.
    #[error("corrupt blob {key}: {reason}")]
    Corrupt { key: BlobKey, reason: String },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A stream was used after it was finished.
    #[error("blob stream is already closed")]
    StreamClosed,
}

impl BlobError {
    /// The caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::StoreNotFound(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidArgument(_) | Self::Config(_) => ErrorKind::InvalidArgument,
            Self::ReadOnly | Self::NotStandaloneFile(_) => ErrorKind::Unsupported,
            Self::Encrypted(_) | Self::EncryptionMismatch { .. } | Self::Manifest(_) => {
                ErrorKind::WrongFormat
            }
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::Crypto(CryptoError::AuthenticationFailed) => ErrorKind::Corrupt,
            Self::Crypto(CryptoError::InvalidKeyLength { .. }) => ErrorKind::InvalidArgument,
            Self::Crypto(CryptoError::KeystreamLimit(_)) => ErrorKind::Unsupported,
            Self::StreamClosed => ErrorKind::ProgrammingError,
        }
    }
}

/// Result alias for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Failure of [`BlobStore::delete_store`]. The store is handed back and
/// remains usable.
#[derive(Debug, thiserror::Error)]
#[error("failed to delete blob store: {error}")]
pub struct DeleteStoreError {
    #[source]
    pub error: BlobError,
    pub store: BlobStore,
}

impl From<DeleteStoreError> for BlobError {
    fn from(err: DeleteStoreError) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_taxonomy() {
        let key = BlobKey::from_hash([1; 32]);
        assert_eq!(BlobError::NotFound(key).kind(), ErrorKind::NotFound);
        assert_eq!(BlobError::Encrypted(key).kind(), ErrorKind::WrongFormat);
        assert_eq!(BlobError::NotStandaloneFile(key).kind(), ErrorKind::Unsupported);
        assert_eq!(BlobError::ReadOnly.kind(), ErrorKind::Unsupported);
        assert_eq!(BlobError::StreamClosed.kind(), ErrorKind::ProgrammingError);
        let mismatch = BlobError::EncryptionMismatch {
            stored: EncryptionAlgorithm::ChaCha20Blake3,
            requested: EncryptionAlgorithm::None,
        };
        assert_eq!(mismatch.kind(), ErrorKind::WrongFormat);
        assert_eq!(
            BlobError::Crypto(CryptoError::AuthenticationFailed).kind(),
            ErrorKind::Corrupt
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(BlobError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn display_includes_key() {
        let key = BlobKey::from_hash([2; 32]);
        let msg = BlobError::NotFound(key).to_string();
        assert!(msg.contains(&key.to_digest_string()));
    }
}
