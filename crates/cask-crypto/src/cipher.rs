//! Seekable encryption at rest for blob files.
//!
//! An encrypted blob file is laid out as:
//!
//! ```text
//! [12 bytes: random nonce]
//! [N bytes:  ChaCha20 ciphertext of the N-byte plaintext]
//! [16 bytes: tag = BLAKE3-keyed(mac_key, nonce || ciphertext)[..16]]
//! ```
//!
//! The cipher and MAC keys are derived from the store key with
//! `blake3::derive_key` under distinct contexts. ChaCha20 is a seekable
//! stream cipher, so any plaintext range can be decrypted without touching
//! the bytes before it. Both directions run incrementally; nothing buffers a
//! whole blob.

use std::fmt;

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha20, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of a store encryption key (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the per-file nonce stored at the start of an encrypted blob.
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag stored at the end of an encrypted blob.
pub const TAG_SIZE: usize = 16;

/// Total bytes an encrypted blob file carries beyond its plaintext.
pub const OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

const CIPHER_CONTEXT: &str = "cask 2024-06 blob cipher key";
const MAC_CONTEXT: &str = "cask 2024-06 blob authentication key";

/// Encryption algorithm configured for a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionAlgorithm {
    /// Blobs are stored as plain files.
    #[default]
    None,
    /// ChaCha20 encryption with a truncated keyed-BLAKE3 tag.
    #[serde(rename = "chacha20_blake3")]
    ChaCha20Blake3,
}

/// A 256-bit store encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Wrap raw key bytes, such as a key loaded from a host keychain.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Like [`EncryptionKey::from_bytes`], failing unless `bytes` is exactly
    /// [`KEY_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Generate a random key from the system CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Raw key bytes, for persisting the key outside the store.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Per-store key material, derived once when a store opens.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BlobCipher {
    cipher_key: [u8; KEY_SIZE],
    mac_key: [u8; KEY_SIZE],
}

impl BlobCipher {
    /// Derive the cipher and MAC keys from a store key.
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher_key: blake3::derive_key(CIPHER_CONTEXT, key.as_bytes()),
            mac_key: blake3::derive_key(MAC_CONTEXT, key.as_bytes()),
        }
    }

    /// Start encrypting a new blob under a fresh random nonce.
    pub fn encryptor(&self) -> Encryptor {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.encryptor_with_nonce(nonce)
    }

    /// Start encrypting under a caller-chosen nonce. A nonce must never be
    /// reused with the same key; use [`BlobCipher::encryptor`] outside tests.
    pub fn encryptor_with_nonce(&self, nonce: [u8; NONCE_SIZE]) -> Encryptor {
        let mut mac = blake3::Hasher::new_keyed(&self.mac_key);
        mac.update(&nonce);
        Encryptor {
            cipher: self.stream(&nonce),
            mac,
            nonce,
        }
    }

    /// Decryptor for a blob written under `nonce`.
    pub fn decryptor(&self, nonce: [u8; NONCE_SIZE]) -> Decryptor {
        Decryptor {
            cipher: self.stream(&nonce),
        }
    }

    /// Tag verifier for a blob written under `nonce`. Feed it the ciphertext.
    pub fn verifier(&self, nonce: [u8; NONCE_SIZE]) -> TagVerifier {
        let mut mac = blake3::Hasher::new_keyed(&self.mac_key);
        mac.update(&nonce);
        TagVerifier { mac }
    }

    fn stream(&self, nonce: &[u8; NONCE_SIZE]) -> ChaCha20 {
        ChaCha20::new(Key::from_slice(&self.cipher_key), Nonce::from_slice(nonce))
    }
}

impl fmt::Debug for BlobCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlobCipher(<redacted>)")
    }
}

/// Incremental encrypt-then-MAC over one blob.
pub struct Encryptor {
    cipher: ChaCha20,
    mac: blake3::Hasher,
    nonce: [u8; NONCE_SIZE],
}

impl Encryptor {
    /// The bytes that must precede the ciphertext in the file.
    pub fn header(&self) -> [u8; NONCE_SIZE] {
        self.nonce
    }

    /// Encrypt the next chunk of plaintext in place.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.cipher
            .try_apply_keystream(buf)
            .map_err(|e| CryptoError::KeystreamLimit(e.to_string()))?;
        self.mac.update(buf);
        Ok(())
    }

    /// The tag to append after the last ciphertext byte.
    pub fn finish(self) -> [u8; TAG_SIZE] {
        truncate_tag(&self.mac)
    }
}

/// Random-access decryption of one blob's ciphertext.
pub struct Decryptor {
    cipher: ChaCha20,
}

impl Decryptor {
    /// Position the keystream at plaintext offset `pos`.
    pub fn seek(&mut self, pos: u64) -> Result<(), CryptoError> {
        self.cipher
            .try_seek(pos)
            .map_err(|e| CryptoError::KeystreamLimit(e.to_string()))
    }

    /// Decrypt ciphertext read from the current position, advancing it.
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.cipher
            .try_apply_keystream(buf)
            .map_err(|e| CryptoError::KeystreamLimit(e.to_string()))
    }
}

/// Recomputes a blob's tag from its ciphertext.
pub struct TagVerifier {
    mac: blake3::Hasher,
}

impl TagVerifier {
    /// Feed the next chunk of ciphertext, in file order.
    pub fn update(&mut self, ciphertext: &[u8]) {
        self.mac.update(ciphertext);
    }

    /// Compare against the stored tag in constant time.
    pub fn verify(self, stored: &[u8]) -> Result<(), CryptoError> {
        let computed = truncate_tag(&self.mac);
        if stored.len() != TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let diff = computed
            .iter()
            .zip(stored)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(CryptoError::AuthenticationFailed)
        }
    }
}

fn truncate_tag(mac: &blake3::Hasher) -> [u8; TAG_SIZE] {
    let full = mac.finalize();
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&full.as_bytes()[..TAG_SIZE]);
    tag
}
