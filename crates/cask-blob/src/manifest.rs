use std::fs;
use std::io::{self, Write};
use std::path::Path;

use cask_crypto::EncryptionAlgorithm;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BlobError, BlobResult};

/// Name of the manifest file kept in every store directory.
///
/// It never parses as a blob filename, so listings skip it.
pub const MANIFEST_FILE: &str = "cask-store.toml";

/// Highest manifest format this build understands.
pub const MANIFEST_FORMAT: u32 = 1;

/// Per-directory record of how the store's blobs are laid out on disk.
///
/// Written once when a writable store is first opened and checked on every
/// later open, so a directory is always read the way it was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format: u32,
    pub encryption: EncryptionAlgorithm,
}

impl StoreManifest {
    /// A manifest in the current format.
    pub fn new(encryption: EncryptionAlgorithm) -> Self {
        Self {
            format: MANIFEST_FORMAT,
            encryption,
        }
    }

    /// Parse a manifest from TOML text.
    pub fn from_toml_str(s: &str) -> BlobResult<Self> {
        let manifest: Self = toml::from_str(s).map_err(|e| BlobError::Manifest(e.to_string()))?;
        if manifest.format == 0 || manifest.format > MANIFEST_FORMAT {
            return Err(BlobError::Manifest(format!(
                "unsupported manifest format {}",
                manifest.format
            )));
        }
        Ok(manifest)
    }

    /// Serialize to the TOML text kept on disk.
    pub fn to_toml_string(&self) -> BlobResult<String> {
        toml::to_string(self).map_err(|e| BlobError::Manifest(e.to_string()))
    }

    /// Read the manifest in `dir`, or `None` if the directory has none yet.
    pub fn load(dir: &Path) -> BlobResult<Option<Self>> {
        match fs::read_to_string(dir.join(MANIFEST_FILE)) {
            Ok(text) => Self::from_toml_str(&text).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the manifest into `dir` through a temp file and rename.
    ///
    /// If another opener got there first, its manifest wins and is returned.
    pub fn store(&self, dir: &Path, sync: bool) -> BlobResult<Self> {
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(self.to_toml_string()?.as_bytes())?;
        if sync {
            file.as_file().sync_all()?;
        }
        match file.persist_noclobber(dir.join(MANIFEST_FILE)) {
            Ok(_) => {
                debug!(dir = %dir.display(), encryption = ?self.encryption, "wrote store manifest");
                if sync {
                    sync_dir(dir)?;
                }
                Ok(*self)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                warn!(dir = %dir.display(), "store manifest appeared concurrently");
                Self::load(dir)?.ok_or_else(|| BlobError::Manifest("manifest vanished".into()))
            }
            Err(e) => Err(e.error.into()),
        }
    }

    /// Fail unless blobs written under `requested` can be read from a store
    /// described by this manifest.
    pub fn check(&self, requested: EncryptionAlgorithm) -> BlobResult<()> {
        if self.encryption == requested {
            Ok(())
        } else {
            Err(BlobError::EncryptionMismatch {
                stored: self.encryption,
                requested,
            })
        }
    }
}

/// Flush a directory's entry table so a completed rename survives a crash.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> BlobResult<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// Directory handles cannot be synced here; file data is already on disk.
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> BlobResult<()> {
    Ok(())
}
