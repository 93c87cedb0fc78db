use cask_types::ErrorKind;

/// Errors from document enumeration.
#[derive(Debug, thiserror::Error)]
pub enum EnumError {
    /// The requested document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The iterator was used outside its lifecycle: before the first
    /// advance, after exhaustion, or after release.
    #[error("iterator misuse: {0}")]
    Misuse(&'static str),

    /// I/O error from the document store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure reported by a document store backend.
    #[error("document store error: {0}")]
    Store(String),
}

impl EnumError {
    /// The caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Misuse(_) => ErrorKind::ProgrammingError,
            Self::Io(_) | Self::Store(_) => ErrorKind::Io,
        }
    }
}

/// Result alias for enumeration.
pub type EnumResult<T> = Result<T, EnumError>;
