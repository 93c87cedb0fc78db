//! Directory-backed, content-addressed blob store.
//!
//! A [`BlobStore`] keeps binary blobs in one directory, one file per blob,
//! each named after its [`BlobKey`](cask_types::BlobKey). Identical content is
//! stored once. Blobs are immutable once installed: they can be read and
//! deleted but never modified.
//!
//! # Operations
//!
//! - [`BlobStore::create`] -- store a buffer, returning its key
//! - [`BlobStore::open_write_stream`] -- build a large blob incrementally
//! - [`BlobStore::contents`] / [`BlobStore::open_read_stream`] -- read a blob
//! - [`BlobStore::file_path`] -- direct file access for unencrypted stores
//! - [`BlobStore::delete`] / [`BlobStore::delete_store`] -- remove data
//!
//! # Design Rules
//!
//! 1. A blob file appears in the store only once it is complete (write to a
//!    temp file, then rename).
//! 2. Reads never take locks; installs and deletes are serialized per store.
//! 3. With an encryption key every blob is encrypted and authenticated at
//!    rest; the key is derived from plaintext either way.
//! 4. Streams borrow the store and cannot outlive it.
//! 5. A store directory keeps the encryption setting it was created with;
//!    reopening it with another setting is refused.

pub mod error;
pub mod manifest;
pub mod options;
pub mod store;
pub mod stream;

pub use error::{BlobError, BlobResult, DeleteStoreError};
pub use manifest::{StoreManifest, MANIFEST_FILE};
pub use options::{StoreFlags, StoreOptions};
pub use store::BlobStore;
pub use stream::{BlobReadStream, BlobWriteStream};
