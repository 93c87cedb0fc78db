//! Document and change enumeration for Cask.
//!
//! A [`DocumentIterator`] walks the metadata of an external document store
//! in one of three modes: an id range, an explicit id list, or the change
//! feed after a sequence number. Bodies are loaded only on request.
//!
//! The store is reached through the [`DocumentStore`] trait:
//!
//! - [`InMemoryDocumentStore`] -- `BTreeMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Enumeration never materializes a document body.
//! 2. An iterator is single-pass; using it after the end or after release is
//!    an error, never stale data.
//! 3. Releasing an iterator early leaves the store untouched.

pub mod error;
pub mod iterator;
pub mod memory;
pub mod options;
pub mod traits;

pub use error::{EnumError, EnumResult};
pub use iterator::DocumentIterator;
pub use memory::{InMemoryDocumentStore, StoredDocument};
pub use options::{EnumeratorFlags, KeyRange};
pub use traits::{DocumentStore, MetaIter};
