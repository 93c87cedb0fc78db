use std::fmt;

/// Error categories a caller of Cask must be able to tell apart.
///
/// Each crate's error enum carries richer detail and maps onto one of these
/// through its `kind()` method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A key or document id is absent. Often expected rather than exceptional.
    NotFound,
    /// Storage failure: disk full, permissions, unreadable file.
    Io,
    /// The caller passed an argument the operation cannot accept.
    InvalidArgument,
    /// The operation is not available for this store or configuration.
    Unsupported,
    /// The data exists but is not in a form the caller can use directly.
    WrongFormat,
    /// Stored data failed an integrity check.
    Corrupt,
    /// A lifecycle bug in the caller, such as advancing an exhausted cursor.
    ProgrammingError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Io => "I/O error",
            Self::InvalidArgument => "invalid argument",
            Self::Unsupported => "unsupported",
            Self::WrongFormat => "wrong format",
            Self::Corrupt => "corrupt data",
            Self::ProgrammingError => "programming error",
        };
        f.write_str(name)
    }
}
