//! Cryptographic primitives for Cask.
//!
//! Provides the domain-separated BLAKE3 content hasher that derives
//! [`cask_types::BlobKey`]s (incrementally, so arbitrarily large blobs hash in
//! constant memory) and the seekable encrypt-then-MAC scheme used for blobs
//! stored at rest.
//!
//! All crypto operations wrap established libraries -- no custom primitives.

pub mod cipher;
pub mod error;
pub mod hasher;

pub use cipher::{
    BlobCipher, Decryptor, EncryptionAlgorithm, EncryptionKey, Encryptor, TagVerifier, KEY_SIZE,
    NONCE_SIZE, OVERHEAD, TAG_SIZE,
};
pub use error::CryptoError;
pub use hasher::{BlobDigest, ContentHasher};
