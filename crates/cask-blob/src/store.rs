use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use cask_crypto::{BlobCipher, ContentHasher, NONCE_SIZE};
use cask_types::BlobKey;
use tracing::{debug, warn};

use crate::error::{BlobError, BlobResult, DeleteStoreError};
use crate::manifest::{sync_dir, StoreManifest};
use crate::options::StoreOptions;
use crate::stream::{BlobReadStream, BlobWriteStream};

/// A content-addressed store of binary blobs, kept as files in a directory.
///
/// Each blob lives in `<dir>/<hex key>.blob`. New blobs are written to a
/// temporary file in the same directory and renamed into place, so a blob is
/// either fully present or absent. Reads take no locks and may run from any
/// number of threads; installs and deletes are serialized by a per-store
/// mutex so racing writers of the same content still produce one file.
///
/// The directory also holds a small manifest recording whether its blobs are
/// encrypted. Opening a directory with a different encryption setting than
/// it was created with fails with [`BlobError::EncryptionMismatch`].
///
/// Streams borrow the store, so a store cannot be closed or deleted while a
/// stream over it is alive.
pub struct BlobStore {
    dir: PathBuf,
    options: StoreOptions,
    cipher: Option<BlobCipher>,
    write_lock: Mutex<()>,
}

impl BlobStore {
    /// Value returned by [`BlobStore::size`] for a key with no blob.
    pub const NOT_FOUND: i64 = -1;

    /// Open the store in `dir`, creating the directory if the options allow.
    ///
    /// A writable store records its encryption setting in a manifest on
    /// first open. Later opens must request the same setting. A read-only
    /// open of a directory without a manifest trusts the options.
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> BlobResult<Self> {
        options.validate()?;
        let dir = normalize_dir(dir.as_ref())?;

        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(BlobError::InvalidArgument(format!(
                    "{} is not a directory",
                    dir.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !options.creates() {
                    return Err(BlobError::StoreNotFound(dir));
                }
                fs::create_dir_all(&dir)?;
                debug!(dir = %dir.display(), "created blob store directory");
            }
            Err(e) => return Err(e.into()),
        }

        match StoreManifest::load(&dir)? {
            Some(manifest) => manifest.check(options.encryption)?,
            None if options.is_read_only() => {
                debug!(dir = %dir.display(), "blob store has no manifest");
            }
            None => StoreManifest::new(options.encryption)
                .store(&dir, options.sync_on_install)?
                .check(options.encryption)?,
        }

        let cipher = options.encryption_key.as_ref().map(BlobCipher::new);
        debug!(
            dir = %dir.display(),
            encrypted = cipher.is_some(),
            read_only = options.is_read_only(),
            "opened blob store"
        );

        Ok(Self {
            dir,
            options,
            cipher,
            write_lock: Mutex::new(()),
        })
    }

    /// The store's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether blobs are encrypted at rest. When true, [`BlobStore::file_path`]
    /// always fails and blobs must be read through the store.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Whether mutating operations are rejected with [`BlobError::ReadOnly`].
    pub fn is_read_only(&self) -> bool {
        self.options.is_read_only()
    }

    /// Release the store. Equivalent to dropping it.
    pub fn close(self) {}

    /// Delete every blob and the store directory itself.
    ///
    /// On success the store is consumed. On failure it is returned inside
    /// the error, still open.
    pub fn delete_store(self) -> Result<(), DeleteStoreError> {
        if self.is_read_only() {
            return Err(DeleteStoreError {
                error: BlobError::ReadOnly,
                store: self,
            });
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            return Err(DeleteStoreError {
                error: e.into(),
                store: self,
            });
        }
        debug!(dir = %self.dir.display(), "deleted blob store");
        Ok(())
    }

    /// Whether a blob with this key is present.
    pub fn contains(&self, key: &BlobKey) -> bool {
        self.blob_path(key).is_file()
    }

    /// Apparent size of a blob, or [`BlobStore::NOT_FOUND`].
    ///
    /// For an encrypted store the value includes the 16-byte authentication
    /// tag, so it may exceed the plaintext length by up to 16 bytes. Use
    /// [`BlobReadStream::len`] for the exact length.
    pub fn size(&self, key: &BlobKey) -> i64 {
        match self.blob_size(key) {
            Ok(Some(size)) => i64::try_from(size).unwrap_or(i64::MAX),
            Ok(None) => Self::NOT_FOUND,
            Err(e) => {
                warn!(key = %key, error = %e, "could not stat blob");
                Self::NOT_FOUND
            }
        }
    }

    /// Apparent size of a blob, surfacing I/O errors.
    pub fn blob_size(&self, key: &BlobKey) -> BlobResult<Option<u64>> {
        match fs::metadata(self.blob_path(key)) {
            Ok(meta) if meta.is_file() => Ok(Some(self.apparent_size(meta.len()))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a whole blob into memory.
    ///
    /// Meant for small and medium blobs; stream large ones with
    /// [`BlobStore::open_read_stream`].
    pub fn contents(&self, key: &BlobKey) -> BlobResult<Vec<u8>> {
        self.open_read_stream(key)?.read_all()
    }

    /// Path of the file holding a blob, for callers that can read it directly.
    ///
    /// This is an optimization only: it fails with [`BlobError::Encrypted`]
    /// when the store is encrypted and [`BlobError::NotStandaloneFile`] when
    /// the blob is not a plain file, and callers must then fall back to
    /// [`BlobStore::contents`] or a read stream. The file must never be
    /// opened for writing.
    pub fn file_path(&self, key: &BlobKey) -> BlobResult<PathBuf> {
        let path = self.blob_path(key);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BlobError::NotFound(*key))
            }
            Err(e) => return Err(e.into()),
        };
        if self.is_encrypted() {
            return Err(BlobError::Encrypted(*key));
        }
        if !meta.is_file() {
            return Err(BlobError::NotStandaloneFile(*key));
        }
        Ok(path)
    }

    /// Store `contents` as a blob and return its key.
    ///
    /// If a blob with the same content already exists nothing is written.
    pub fn create(&self, contents: &[u8]) -> BlobResult<BlobKey> {
        self.ensure_writable()?;
        let key = ContentHasher::BLOB.hash(contents);
        if self.contains(&key) {
            debug!(key = %key, "blob already stored");
            return Ok(key);
        }
        let mut stream = self.open_write_stream()?;
        stream.write(contents)?;
        stream.install()
    }

    /// Remove a blob.
    pub fn delete(&self, key: &BlobKey) -> BlobResult<()> {
        self.ensure_writable()?;
        let _guard = self.write_lock.lock().expect("blob store write lock poisoned");
        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => {
                debug!(key = %key, "deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(*key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a blob for random-access reading.
    ///
    /// On an encrypted store this authenticates the whole file before
    /// returning, so opening costs one full read of the blob. Seeks and reads
    /// on the returned stream are then proportional to the bytes read. Keep
    /// a stream open rather than reopening it for each small range.
    pub fn open_read_stream(&self, key: &BlobKey) -> BlobResult<BlobReadStream<'_>> {
        BlobReadStream::open(self, *key)
    }

    /// Start writing a new blob. Call [`BlobWriteStream::install`] to add it
    /// to the store; dropping the stream discards everything written.
    pub fn open_write_stream(&self) -> BlobResult<BlobWriteStream<'_>> {
        self.ensure_writable()?;
        BlobWriteStream::open(self)
    }

    /// Number of blobs in the store.
    pub fn count(&self) -> BlobResult<u64> {
        Ok(self.scan()?.len() as u64)
    }

    /// Sum of the apparent sizes of all blobs.
    pub fn total_size(&self) -> BlobResult<u64> {
        Ok(self.scan()?.iter().map(|(_, size)| size).sum())
    }

    /// All blob keys in the store, sorted.
    pub fn keys(&self) -> BlobResult<Vec<BlobKey>> {
        let mut keys: Vec<BlobKey> = self.scan()?.into_iter().map(|(key, _)| key).collect();
        keys.sort();
        Ok(keys)
    }

    pub(crate) fn blob_path(&self, key: &BlobKey) -> PathBuf {
        self.dir.join(key.filename())
    }

    pub(crate) fn cipher(&self) -> Option<&BlobCipher> {
        self.cipher.as_ref()
    }

    /// Move a finished temp file into place under `key`. With
    /// `sync_on_install` the directory is synced after the rename.
    pub(crate) fn install_file(&self, file: tempfile::NamedTempFile, key: &BlobKey) -> BlobResult<()> {
        let target = self.blob_path(key);
        let _guard = self.write_lock.lock().expect("blob store write lock poisoned");
        match file.persist_noclobber(&target) {
            Ok(_) => {
                if self.options.sync_on_install {
                    sync_dir(&self.dir)?;
                }
                debug!(key = %key, "installed blob");
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(key = %key, "blob already stored; discarding duplicate");
                Ok(())
            }
            Err(e) => Err(e.error.into()),
        }
    }

    fn apparent_size(&self, file_len: u64) -> u64 {
        if self.is_encrypted() {
            file_len.saturating_sub(NONCE_SIZE as u64)
        } else {
            file_len
        }
    }

    fn ensure_writable(&self) -> BlobResult<()> {
        if self.is_read_only() {
            Err(BlobError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn scan(&self) -> BlobResult<Vec<(BlobKey, u64)>> {
        let mut blobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(BlobKey::from_filename) else {
                continue;
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                // Deleted between listing and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                warn!(key = %key, "ignoring non-file entry in blob store");
                continue;
            }
            blobs.push((key, self.apparent_size(meta.len())));
        }
        Ok(blobs)
    }
}

impl Drop for BlobStore {
    fn drop(&mut self) {
        debug!(dir = %self.dir.display(), "closed blob store");
    }
}

impl fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStore")
            .field("dir", &self.dir)
            .field("encrypted", &self.is_encrypted())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

/// Give a store path plain directory semantics: no trailing separator, no
/// `.` components, never empty.
fn normalize_dir(path: &Path) -> BlobResult<PathBuf> {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        if path.as_os_str().is_empty() {
            return Err(BlobError::InvalidArgument("empty store path".into()));
        }
        return Ok(PathBuf::from("."));
    }
    Ok(normalized)
}
