use std::io;

use cask_types::BlobKey;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"cask-blob-v1"`) that is prepended
/// to every hash computation, so keys produced for blobs can never collide
/// with hashes the host computes for other purposes over the same bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for blob contents. Every [`BlobKey`] in a store comes from here.
    pub const BLOB: Self = Self {
        domain: "cask-blob-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash a complete buffer.
    pub fn hash(&self, data: &[u8]) -> BlobKey {
        let mut digest = self.digest();
        digest.update(data);
        digest.finalize()
    }

    /// Start an incremental digest. Feeding the same bytes in any chunking
    /// yields the same key as [`ContentHasher::hash`].
    pub fn digest(&self) -> BlobDigest {
        let mut inner = blake3::Hasher::new();
        inner.update(self.domain.as_bytes());
        inner.update(b":");
        BlobDigest { inner, bytes: 0 }
    }

    /// Verify that data produces the expected key.
    pub fn verify(&self, data: &[u8], expected: &BlobKey) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// An in-progress content digest.
#[derive(Clone)]
pub struct BlobDigest {
    inner: blake3::Hasher,
    bytes: u64,
}

impl BlobDigest {
    /// Feed the next chunk of plaintext.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of content bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// The key for everything hashed so far. The digest stays usable.
    pub fn finalize(&self) -> BlobKey {
        BlobKey::from_hash(*self.inner.finalize().as_bytes())
    }
}

impl io::Write for BlobDigest {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
