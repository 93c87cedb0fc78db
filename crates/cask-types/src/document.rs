use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic sequence number assigned by a document store to each mutation.
///
/// `Sequence(0)` means "no sequence": it is the watermark to pass when a
/// change feed should start from the beginning, and the sequence reported
/// for documents that do not exist.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl Sequence {
    /// The "no sequence" value.
    pub const NONE: Self = Self(0);

    /// Wrap a raw sequence number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw sequence number.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is [`Sequence::NONE`].
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The sequence following this one.
    ///
    /// # Panics
    ///
    /// Panics if `self` is `u64::MAX`. Stores assigning sequences should use
    /// [`Sequence::checked_next`].
    pub const fn next(self) -> Self {
        match self.checked_next() {
            Some(next) => next,
            None => panic!("sequence space exhausted"),
        }
    }

    /// The sequence following this one, or `None` once the space is used up.
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

bitflags::bitflags! {
    /// State bits describing a document's current revision.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DocumentFlags: u32 {
        /// The current revision is a deletion (tombstone).
        const DELETED = 0x01;
        /// The document has unresolved conflicting revisions.
        const CONFLICTED = 0x02;
        /// The current revision references blobs.
        const HAS_ATTACHMENTS = 0x04;
        /// The document exists in the store.
        const EXISTS = 0x1000;
    }
}

impl Default for DocumentFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// The metadata tuple a document store can hand out without reading a body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Document identifier (the keyspace ordering key).
    pub id: String,
    /// Current revision identifier; empty when the document does not exist.
    pub rev_id: String,
    pub flags: DocumentFlags,
    /// Sequence of the document's latest mutation.
    pub sequence: Sequence,
}

impl DocumentMeta {
    /// Metadata for an existing document. `EXISTS` is always set.
    pub fn new(
        id: impl Into<String>,
        rev_id: impl Into<String>,
        flags: DocumentFlags,
        sequence: Sequence,
    ) -> Self {
        Self {
            id: id.into(),
            rev_id: rev_id.into(),
            flags: flags | DocumentFlags::EXISTS,
            sequence,
        }
    }

    /// Marker for a requested id that the store does not contain.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev_id: String::new(),
            flags: DocumentFlags::empty(),
            sequence: Sequence::NONE,
        }
    }

    /// Whether the store knows this document, tombstones included.
    pub fn exists(&self) -> bool {
        self.flags.contains(DocumentFlags::EXISTS)
    }

    /// Whether the current revision is a deletion.
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(DocumentFlags::DELETED)
    }

    /// Whether the document has unresolved conflicts.
    pub fn is_conflicted(&self) -> bool {
        self.flags.contains(DocumentFlags::CONFLICTED)
    }
}
