use cask_types::{DocumentMeta, Sequence};

use crate::error::EnumResult;
use crate::options::KeyRange;

/// A stream of document metadata produced by a [`DocumentStore`].
pub type MetaIter<'a> = Box<dyn Iterator<Item = EnumResult<DocumentMeta>> + 'a>;

/// The document store a [`DocumentIterator`](crate::DocumentIterator) reads.
///
/// Implementations must satisfy these invariants:
/// - Every mutation gets a sequence greater than all earlier ones.
/// - Metadata is available without reading a document body.
/// - `scan` and `changes_since` never materialize bodies.
/// - Deleted documents (tombstones) are reported with `DELETED` set; callers
///   do the filtering.
pub trait DocumentStore: Send + Sync {
    /// A fully materialized document.
    type Document;

    /// Metadata for one document, or `None` if the id is unknown.
    fn lookup_by_id(&self, id: &str) -> EnumResult<Option<DocumentMeta>>;

    /// Metadata of every document whose id falls in `range`, in ascending id
    /// order or descending when `descending` is set.
    fn scan(&self, range: &KeyRange, descending: bool) -> EnumResult<MetaIter<'_>>;

    /// Metadata of every document whose latest sequence is greater than
    /// `since`, in ascending sequence order.
    fn changes_since(&self, since: Sequence) -> EnumResult<MetaIter<'_>>;

    /// Load the full document described by `meta`.
    ///
    /// Returns [`EnumError::NotFound`](crate::EnumError::NotFound) if the
    /// document no longer exists, or if its current sequence differs from
    /// `meta.sequence` because it changed after `meta` was read. The returned
    /// document always matches the revision `meta` names.
    fn materialize(&self, meta: &DocumentMeta) -> EnumResult<Self::Document>;
}
