//! Streaming access to individual blobs.
//!
//! A [`BlobReadStream`] reads one blob's plaintext with random access. A
//! [`BlobWriteStream`] builds a new blob incrementally and adds it to the
//! store on [`BlobWriteStream::install`]. Both borrow their store.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;

use cask_crypto::{BlobDigest, ContentHasher, Decryptor, Encryptor, NONCE_SIZE, OVERHEAD, TAG_SIZE};
use cask_types::BlobKey;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{BlobError, BlobResult};
use crate::store::BlobStore;

const CHUNK_SIZE: usize = 64 * 1024;

/// Random-access reader over one blob's plaintext.
///
/// The stream owns its own file handle, so it keeps working if the blob is
/// deleted from the store while the stream is open (on platforms that allow
/// unlinking open files).
///
/// Opening a stream on an encrypted store reads and authenticates the whole
/// file once. After that, seeks only move the cipher's keystream position.
pub struct BlobReadStream<'a> {
    key: BlobKey,
    file: File,
    len: u64,
    pos: u64,
    data_offset: u64,
    decryptor: Option<Decryptor>,
    _store: PhantomData<&'a BlobStore>,
}

impl<'a> BlobReadStream<'a> {
    pub(crate) fn open(store: &'a BlobStore, key: BlobKey) -> BlobResult<Self> {
        let mut file = match File::open(store.blob_path(&key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(BlobError::NotFound(key)),
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(BlobError::NotFound(key));
        }
        let file_len = meta.len();

        let Some(cipher) = store.cipher() else {
            return Ok(Self {
                key,
                file,
                len: file_len,
                pos: 0,
                data_offset: 0,
                decryptor: None,
                _store: PhantomData,
            });
        };

        if file_len < OVERHEAD as u64 {
            return Err(BlobError::Corrupt {
                key,
                reason: format!("encrypted file is only {file_len} bytes"),
            });
        }
        let len = file_len - OVERHEAD as u64;

        let mut nonce = [0u8; NONCE_SIZE];
        read_exact_or_corrupt(&mut file, &mut nonce, key)?;

        let mut verifier = cipher.verifier(nonce);
        let mut buf = vec![0u8; CHUNK_SIZE.min(len as usize)];
        let mut remaining = len;
        while remaining > 0 {
            let n = (remaining as usize).min(buf.len());
            read_exact_or_corrupt(&mut file, &mut buf[..n], key)?;
            verifier.update(&buf[..n]);
            remaining -= n as u64;
        }
        let mut tag = [0u8; TAG_SIZE];
        read_exact_or_corrupt(&mut file, &mut tag, key)?;
        verifier.verify(&tag).map_err(|_| BlobError::Corrupt {
            key,
            reason: "authentication tag mismatch".into(),
        })?;

        file.seek(SeekFrom::Start(NONCE_SIZE as u64))?;
        Ok(Self {
            key,
            file,
            len,
            pos: 0,
            data_offset: NONCE_SIZE as u64,
            decryptor: Some(cipher.decryptor(nonce)),
            _store: PhantomData,
        })
    }

    /// Key of the blob being read.
    pub fn key(&self) -> &BlobKey {
        &self.key
    }

    /// Exact plaintext length of the blob.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the blob has no plaintext bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current read position in the plaintext.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `buf.len()` bytes from the current position. Returns 0 at
    /// the end of the blob.
    pub fn read(&mut self, buf: &mut [u8]) -> BlobResult<usize> {
        let available = self.len - self.pos;
        let want = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }
        let n = self.file.read(&mut buf[..want])?;
        if n == 0 {
            return Err(BlobError::Corrupt {
                key: self.key,
                reason: format!("file ended at {} of {} bytes", self.pos, self.len),
            });
        }
        if let Some(decryptor) = &mut self.decryptor {
            decryptor.decrypt_in_place(&mut buf[..n])?;
        }
        self.pos += n as u64;
        Ok(n)
    }

    /// Move to plaintext offset `pos`. Seeking to the end is allowed; past it
    /// is not.
    pub fn seek(&mut self, pos: u64) -> BlobResult<()> {
        if pos > self.len {
            return Err(BlobError::InvalidArgument(format!(
                "seek to {pos} beyond blob length {}",
                self.len
            )));
        }
        self.file.seek(SeekFrom::Start(self.data_offset + pos))?;
        if let Some(decryptor) = &mut self.decryptor {
            decryptor.seek(pos)?;
        }
        self.pos = pos;
        Ok(())
    }

    /// Seek to `pos`, then fill as much of `buf` as the blob allows.
    pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> BlobResult<usize> {
        self.seek(pos)?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    /// Read the whole blob from the start, whatever the current position.
    pub fn read_all(&mut self) -> BlobResult<Vec<u8>> {
        let mut data = vec![0u8; usize::try_from(self.len).unwrap_or(usize::MAX)];
        let n = self.read_at(0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }

    /// Release the stream. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Read for BlobReadStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        BlobReadStream::read(self, buf).map_err(into_io_error)
    }
}

impl Seek for BlobReadStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of blob")
        })?;
        BlobReadStream::seek(self, target).map_err(into_io_error)?;
        Ok(target)
    }
}

impl std::fmt::Debug for BlobReadStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReadStream")
            .field("key", &self.key)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

struct Pending {
    file: BufWriter<NamedTempFile>,
    encryptor: Option<Encryptor>,
}

/// Builds a new blob from a sequence of writes.
///
/// Content goes to a temporary file in the store directory while its key is
/// hashed incrementally. [`BlobWriteStream::install`] moves the file into
/// place; dropping the stream without installing discards it.
pub struct BlobWriteStream<'a> {
    store: &'a BlobStore,
    pending: Option<Pending>,
    digest: BlobDigest,
    scratch: Vec<u8>,
}

impl<'a> BlobWriteStream<'a> {
    pub(crate) fn open(store: &'a BlobStore) -> BlobResult<Self> {
        let temp = NamedTempFile::new_in(store.dir())?;
        let mut file = BufWriter::with_capacity(CHUNK_SIZE, temp);
        let encryptor = match store.cipher() {
            Some(cipher) => {
                let encryptor = cipher.encryptor();
                file.write_all(&encryptor.header())?;
                Some(encryptor)
            }
            None => None,
        };
        Ok(Self {
            store,
            pending: Some(Pending { file, encryptor }),
            digest: ContentHasher::BLOB.digest(),
            scratch: Vec::new(),
        })
    }

    /// Append `data` to the blob.
    ///
    /// If the write fails the stream is finished and the partial blob is
    /// discarded; later writes return [`BlobError::StreamClosed`].
    pub fn write(&mut self, data: &[u8]) -> BlobResult<()> {
        let pending = self.pending.as_mut().ok_or(BlobError::StreamClosed)?;
        if let Err(e) = write_chunks(pending, &mut self.scratch, data) {
            self.pending = None;
            warn!(error = %e, "blob write failed; discarding partial blob");
            return Err(e);
        }
        self.digest.update(data);
        Ok(())
    }

    /// Plaintext bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.digest.bytes_hashed()
    }

    /// The key the content written so far would be installed under.
    pub fn compute_key(&self) -> BlobKey {
        self.digest.finalize()
    }

    /// Add the blob to the store and return its key.
    ///
    /// If the store already holds identical content the new copy is
    /// discarded and the existing key returned.
    pub fn install(mut self) -> BlobResult<BlobKey> {
        let Pending { file, encryptor } = self.pending.take().ok_or(BlobError::StreamClosed)?;
        let mut file = file.into_inner().map_err(|e| e.into_error())?;
        if let Some(encryptor) = encryptor {
            file.write_all(&encryptor.finish())?;
        }
        if self.store.options().sync_on_install {
            file.as_file().sync_all()?;
        }
        let key = self.digest.finalize();
        self.store.install_file(file, &key)?;
        Ok(key)
    }

    /// Discard everything written. Equivalent to dropping the stream.
    pub fn abandon(mut self) {
        if self.pending.take().is_some() {
            debug!(bytes = self.bytes_written(), "abandoned blob write");
        }
    }
}

impl Drop for BlobWriteStream<'_> {
    fn drop(&mut self) {
        if self.pending.take().is_some() {
            warn!(
                bytes = self.bytes_written(),
                "blob write stream dropped without install; discarding"
            );
        }
    }
}

impl Write for BlobWriteStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BlobWriteStream::write(self, buf).map_err(into_io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.pending {
            Some(pending) => pending.file.flush(),
            None => Err(into_io_error(BlobError::StreamClosed)),
        }
    }
}

impl std::fmt::Debug for BlobWriteStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriteStream")
            .field("bytes_written", &self.bytes_written())
            .field("open", &self.pending.is_some())
            .finish()
    }
}

fn write_chunks(pending: &mut Pending, scratch: &mut Vec<u8>, data: &[u8]) -> BlobResult<()> {
    let Some(encryptor) = &mut pending.encryptor else {
        pending.file.write_all(data)?;
        return Ok(());
    };
    for chunk in data.chunks(CHUNK_SIZE) {
        scratch.clear();
        scratch.extend_from_slice(chunk);
        encryptor.encrypt_in_place(scratch)?;
        pending.file.write_all(scratch)?;
    }
    Ok(())
}

fn read_exact_or_corrupt(file: &mut File, buf: &mut [u8], key: BlobKey) -> BlobResult<()> {
    file.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BlobError::Corrupt {
            key,
            reason: "encrypted file is truncated".into(),
        },
        _ => e.into(),
    })
}

fn into_io_error(err: BlobError) -> io::Error {
    match err {
        BlobError::Io(e) => e,
        other => io::Error::other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StoreOptions;
    use cask_crypto::EncryptionKey;
    use cask_types::ErrorKind;
    use proptest::prelude::*;

    fn plain_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path(), StoreOptions::default()).unwrap();
        (dir, store)
    }

    fn encrypted_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions::default().with_encryption_key(EncryptionKey::generate());
        let store = BlobStore::open(dir.path(), options).unwrap();
        (dir, store)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn dir_entries(store: &BlobStore) -> usize {
        std::fs::read_dir(store.dir()).unwrap().count()
    }

    #[test]
    fn write_stream_matches_create() {
        let (_dir, store) = plain_store();
        let data = pattern(200_000);

        let mut stream = store.open_write_stream().unwrap();
        for chunk in data.chunks(7_777) {
            stream.write(chunk).unwrap();
        }
        assert_eq!(stream.bytes_written(), data.len() as u64);
        let streamed = stream.install().unwrap();

        assert_eq!(streamed, ContentHasher::BLOB.hash(&data));
        assert_eq!(store.create(&data).unwrap(), streamed);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn compute_key_does_not_install() {
        let (_dir, store) = plain_store();
        let mut stream = store.open_write_stream().unwrap();
        stream.write(b"pending").unwrap();
        let key = stream.compute_key();
        assert_eq!(key, ContentHasher::BLOB.hash(b"pending"));
        assert_eq!(store.size(&key), BlobStore::NOT_FOUND);
        assert_eq!(stream.install().unwrap(), key);
        assert_eq!(store.size(&key), 7);
    }

    #[test]
    fn abandoned_stream_leaves_no_trace() {
        let (_dir, store) = plain_store();
        let before = dir_entries(&store);

        let mut stream = store.open_write_stream().unwrap();
        stream.write(&pattern(10_000)).unwrap();
        let key = stream.compute_key();
        stream.abandon();

        let mut dropped = store.open_write_stream().unwrap();
        dropped.write(b"also discarded").unwrap();
        drop(dropped);

        assert_eq!(dir_entries(&store), before);
        assert_eq!(store.size(&key), BlobStore::NOT_FOUND);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn installing_existing_content_deduplicates() {
        let (_dir, store) = encrypted_store();
        let first = store.create(b"twice").unwrap();
        let mut stream = store.open_write_stream().unwrap();
        stream.write(b"twice").unwrap();
        assert_eq!(stream.install().unwrap(), first);
        assert_eq!(store.count().unwrap(), 1);
        // The blob and the store manifest, no leftover temp files.
        assert_eq!(dir_entries(&store), 2);
    }

    #[test]
    fn io_write_and_copy() {
        let (_dir, store) = plain_store();
        let data = pattern(100_000);
        let mut stream = store.open_write_stream().unwrap();
        io::copy(&mut data.as_slice(), &mut stream).unwrap();
        stream.flush().unwrap();
        let key = stream.install().unwrap();
        assert_eq!(store.contents(&key).unwrap(), data);
    }

    #[test]
    fn read_stream_reads_sequentially() {
        let (_dir, store) = plain_store();
        let data = pattern(10_000);
        let key = store.create(&data).unwrap();

        let mut stream = store.open_read_stream(&key).unwrap();
        assert_eq!(stream.len(), 10_000);
        let mut out = Vec::new();
        let mut buf = [0u8; 999];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        assert_eq!(stream.position(), 10_000);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_stream_of_missing_blob() {
        let (_dir, store) = plain_store();
        let key = ContentHasher::BLOB.hash(b"missing");
        let err = store.open_read_stream(&key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn encrypted_seek_and_read() {
        let (_dir, store) = encrypted_store();
        let data = pattern(150_000);
        let key = store.create(&data).unwrap();

        let mut stream = store.open_read_stream(&key).unwrap();
        assert_eq!(stream.len(), data.len() as u64);

        for &offset in &[0u64, 1, 63, 64, 65, 4095, 70_001, 149_990] {
            let mut buf = [0u8; 100];
            let n = stream.read_at(offset, &mut buf).unwrap();
            let end = (offset as usize + 100).min(data.len());
            assert_eq!(&buf[..n], &data[offset as usize..end], "offset {offset}");
        }

        stream.seek(data.len() as u64).unwrap();
        assert_eq!(stream.read(&mut [0u8; 8]).unwrap(), 0);
        assert_eq!(stream.read_all().unwrap(), data);
    }

    #[test]
    fn encrypted_open_authenticates_whole_file() {
        let (_dir, store) = encrypted_store();
        let data = pattern(200_000);
        let key = store.create(&data).unwrap();
        let path = store.blob_path(&key);
        let mut raw = std::fs::read(&path).unwrap();
        let last_ciphertext = raw.len() - TAG_SIZE - 1;
        raw[last_ciphertext] ^= 0x01;
        std::fs::write(&path, raw).unwrap();

        // Damage near the end is caught even though nothing reads that far.
        let err = store.open_read_stream(&key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn seek_past_end_is_invalid() {
        let (_dir, store) = plain_store();
        let key = store.create(b"tiny").unwrap();
        let mut stream = store.open_read_stream(&key).unwrap();
        let err = stream.seek(5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn io_seek_from_end_and_current() {
        let (_dir, store) = encrypted_store();
        let key = store.create(b"0123456789").unwrap();
        let mut stream = store.open_read_stream(&key).unwrap();

        assert_eq!(Seek::seek(&mut stream, SeekFrom::End(-3)).unwrap(), 7);
        let mut rest = String::new();
        stream.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "789");

        Seek::seek(&mut stream, SeekFrom::Start(2)).unwrap();
        assert_eq!(Seek::seek(&mut stream, SeekFrom::Current(3)).unwrap(), 5);
        let mut two = [0u8; 2];
        Read::read_exact(&mut stream, &mut two).unwrap();
        assert_eq!(&two, b"56");

        assert!(Seek::seek(&mut stream, SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn independent_read_streams() {
        let (_dir, store) = plain_store();
        let key = store.create(b"shared content").unwrap();
        let mut a = store.open_read_stream(&key).unwrap();
        let mut b = store.open_read_stream(&key).unwrap();
        a.seek(7).unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(b.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"shared");
        assert_eq!(a.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"conten");
    }

    #[test]
    fn truncated_encrypted_file_is_corrupt() {
        let (_dir, store) = encrypted_store();
        let key = store.create(b"soon to be damaged").unwrap();
        let path = store.blob_path(&key);
        std::fs::write(&path, [0u8; OVERHEAD - 1]).unwrap();
        let err = store.open_read_stream(&key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn wrong_key_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let key = {
            let options = StoreOptions::default().with_encryption_key(EncryptionKey::generate());
            BlobStore::open(dir.path(), options)
                .unwrap()
                .create(b"locked")
                .unwrap()
        };
        let options = StoreOptions::default().with_encryption_key(EncryptionKey::generate());
        let store = BlobStore::open(dir.path(), options).unwrap();
        assert_eq!(store.contents(&key).unwrap_err().kind(), ErrorKind::Corrupt);
    }

    #[cfg(unix)]
    #[test]
    fn open_read_stream_survives_delete() {
        let (_dir, store) = encrypted_store();
        let data = pattern(5_000);
        let key = store.create(&data).unwrap();

        let mut stream = store.open_read_stream(&key).unwrap();
        store.delete(&key).unwrap();
        assert_eq!(store.size(&key), BlobStore::NOT_FOUND);
        assert_eq!(stream.read_all().unwrap(), data);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_streamed_and_whole_agree(
            data in proptest::collection::vec(any::<u8>(), 0..20_000),
            chunk in 1usize..5_000,
            encrypted in any::<bool>(),
        ) {
            let (_dir, store) = if encrypted { encrypted_store() } else { plain_store() };
            let mut stream = store.open_write_stream().unwrap();
            for piece in data.chunks(chunk) {
                stream.write(piece).unwrap();
            }
            let key = stream.install().unwrap();
            prop_assert_eq!(key, ContentHasher::BLOB.hash(&data));

            let size = store.size(&key);
            prop_assert!(size >= data.len() as i64 && size <= data.len() as i64 + 16);

            let mut reader = store.open_read_stream(&key).unwrap();
            prop_assert_eq!(reader.len(), data.len() as u64);
            prop_assert_eq!(reader.read_all().unwrap(), data);
        }
    }
}
