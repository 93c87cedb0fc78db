use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content digest identifying a blob within a store.
///
/// A `BlobKey` is the domain-separated BLAKE3 hash of a blob's plaintext.
/// Identical content always produces the same key, so a store never needs
/// more than one copy of any given content. Keys are computed by
/// `cask_crypto::ContentHasher`; this type only carries and formats them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobKey([u8; 32]);

impl BlobKey {
    /// Digest length in bytes.
    pub const LEN: usize = 32;

    /// Prefix of the textual digest form (`blake3-<base64>`).
    pub const DIGEST_PREFIX: &'static str = "blake3-";

    /// Extension of the file holding a blob inside a store directory.
    pub const FILE_EXTENSION: &'static str = "blob";

    /// Create a `BlobKey` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Textual digest form: `blake3-` followed by the standard base64 digest.
    ///
    /// This is the form hosts embed in document bodies to reference a blob.
    pub fn to_digest_string(&self) -> String {
        format!("{}{}", Self::DIGEST_PREFIX, STANDARD.encode(self.0))
    }

    /// Parse the textual digest form produced by [`BlobKey::to_digest_string`].
    pub fn from_digest_string(s: &str) -> Result<Self, TypeError> {
        let encoded = s
            .strip_prefix(Self::DIGEST_PREFIX)
            .ok_or_else(|| TypeError::UnknownDigest(s.to_string()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| TypeError::InvalidBase64(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Name of the file storing this blob: `<hex>.blob`.
    pub fn filename(&self) -> String {
        format!("{}.{}", self.to_hex(), Self::FILE_EXTENSION)
    }

    /// Recover a key from a store filename. Returns `None` for anything that
    /// is not a `<hex>.blob` name (temp files, stray entries).
    pub fn from_filename(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(Self::FILE_EXTENSION)?.strip_suffix('.')?;
        Self::from_hex(stem).ok()
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({})", self.short_hex())
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_digest_string())
    }
}

impl FromStr for BlobKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_digest_string(s)
    }
}

impl From<[u8; 32]> for BlobKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<BlobKey> for [u8; 32] {
    fn from(key: BlobKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> BlobKey {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37);
        }
        BlobKey::from_hash(bytes)
    }

    #[test]
    fn digest_string_has_prefix() {
        let s = sample().to_digest_string();
        assert!(s.starts_with("blake3-"));
        assert_eq!(s.parse::<BlobKey>().unwrap(), sample());
    }

    #[test]
    fn digest_string_rejects_other_algorithms() {
        let err = BlobKey::from_digest_string("sha1-VVVVVVVVVVVVVVVVVVVVVVVVVVU=").unwrap_err();
        assert!(matches!(err, TypeError::UnknownDigest(_)));
    }

    #[test]
    fn digest_string_rejects_short_digest() {
        let err = BlobKey::from_digest_string("blake3-AAAA").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 3
            }
        );
    }

    #[test]
    fn digest_string_rejects_bad_base64() {
        let err = BlobKey::from_digest_string("blake3-***").unwrap_err();
        assert!(matches!(err, TypeError::InvalidBase64(_)));
    }

    #[test]
    fn filename_roundtrip() {
        let key = sample();
        let name = key.filename();
        assert!(name.ends_with(".blob"));
        assert_eq!(name.len(), 64 + 5);
        assert_eq!(BlobKey::from_filename(&name), Some(key));
    }

    #[test]
    fn from_filename_ignores_foreign_names() {
        assert_eq!(BlobKey::from_filename(".tmpA1b2C3"), None);
        assert_eq!(BlobKey::from_filename("notes.txt"), None);
        assert_eq!(BlobKey::from_filename("abcd.blob"), None);
        assert_eq!(BlobKey::from_filename("blob"), None);
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(sample().short_hex().len(), 8);
        assert_eq!(format!("{:?}", sample()), format!("BlobKey({})", sample().short_hex()));
    }

    #[test]
    fn serde_roundtrip() {
        let key = sample();
        let json = serde_json::to_string(&key).unwrap();
        let parsed: BlobKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }

    proptest! {
        #[test]
        fn prop_textual_forms_parse_back(bytes: [u8; 32]) {
            let key = BlobKey::from_hash(bytes);
            prop_assert_eq!(BlobKey::from_hex(&key.to_hex()).unwrap(), key);
            prop_assert_eq!(key.to_string().parse::<BlobKey>().unwrap(), key);
        }
    }
}
