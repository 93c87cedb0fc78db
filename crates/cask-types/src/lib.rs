//! Foundation types for Cask.
//!
//! Cask is the storage core a host database composes: a content-addressed
//! blob store and a cursor over a document store's keyspace and change feed.
//! Every other Cask crate depends on `cask-types`.
//!
//! # Key Types
//!
//! - [`BlobKey`] -- Content digest identifying a blob (BLAKE3 of its plaintext)
//! - [`Sequence`] -- Monotonic per-mutation sequence number of a document store
//! - [`DocumentFlags`] -- Per-document state bits (deleted, conflicted, ...)
//! - [`DocumentMeta`] -- The `(id, revision, flags, sequence)` tuple enumerated without bodies
//! - [`ErrorKind`] -- The error categories callers are expected to distinguish

pub mod blob_key;
pub mod document;
pub mod error;
pub mod kind;

pub use blob_key::BlobKey;
pub use document::{DocumentFlags, DocumentMeta, Sequence};
pub use error::TypeError;
pub use kind::ErrorKind;
