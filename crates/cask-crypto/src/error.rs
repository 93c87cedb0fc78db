/// Errors from hashing and encryption operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The ChaCha20 block counter would overflow (content beyond 256 GiB).
    #[error("keystream limit reached: {0}")]
    KeystreamLimit(String),

    #[error("authentication tag mismatch")]
    AuthenticationFailed,
}
