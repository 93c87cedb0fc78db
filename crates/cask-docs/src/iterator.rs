//! Single-pass cursor over a [`DocumentStore`].
//!
//! A [`DocumentIterator`] runs in one of three modes:
//!
//! - **range** ([`DocumentIterator::all_docs`]): documents whose ids fall
//!   between two bounds, optionally skipping the first matches;
//! - **id list** ([`DocumentIterator::some_docs`]): exactly the requested
//!   ids, in the caller's order, with a not-found marker for missing ones;
//! - **change feed** ([`DocumentIterator::changes`]): documents changed after
//!   a sequence number, oldest change first.
//!
//! Enumeration only moves metadata. Bodies are loaded one at a time by
//! [`DocumentIterator::current_document`].

use cask_types::{DocumentFlags, DocumentMeta, Sequence};
use tracing::{debug, warn};

use crate::error::{EnumError, EnumResult};
use crate::options::{EnumeratorFlags, KeyRange};
use crate::traits::{DocumentStore, MetaIter};

enum Mode<'a> {
    Range { metas: MetaIter<'a>, skip: usize },
    Ids { ids: std::vec::IntoIter<String> },
    Changes { metas: MetaIter<'a> },
}

impl Mode<'_> {
    fn name(&self) -> &'static str {
        match self {
            Mode::Range { .. } => "range",
            Mode::Ids { .. } => "id list",
            Mode::Changes { .. } => "change feed",
        }
    }
}

enum State {
    Created,
    Positioned(DocumentMeta),
    Exhausted,
    Released,
}

/// Cursor over documents of a [`DocumentStore`].
///
/// Call [`advance`](Self::advance) until it returns `false`, reading the
/// current record's metadata in between. Once `advance` has returned `false`
/// the cursor is released, and every further call fails with
/// [`EnumError::Misuse`]. An error from the store also ends the enumeration.
pub struct DocumentIterator<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    flags: EnumeratorFlags,
    mode: Option<Mode<'a>>,
    state: State,
}

impl<'a, S: DocumentStore + ?Sized> DocumentIterator<'a, S> {
    /// Enumerate documents with ids between `start` and `end`.
    ///
    /// `None` leaves a side unbounded. With `DESCENDING`, results run from
    /// `start` down to `end`, so `start` is the larger id. The first `skip`
    /// documents that pass the deleted and conflicted filters are dropped.
    pub fn all_docs(
        store: &'a S,
        start: Option<&str>,
        end: Option<&str>,
        skip: usize,
        flags: EnumeratorFlags,
    ) -> EnumResult<Self> {
        let range = KeyRange::from_enumerator(start, end, flags);
        let metas = store.scan(&range, flags.is_descending())?;
        debug!(?start, ?end, skip, flags = flags.bits(), "enumerating documents by id range");
        Ok(Self::new(store, flags, Mode::Range { metas, skip }))
    }

    /// Enumerate exactly `ids`, in order (reversed with `DESCENDING`).
    ///
    /// Missing ids produce a marker whose flags lack `EXISTS`. Deleted and
    /// conflicted filters do not apply.
    pub fn some_docs<I>(store: &'a S, ids: I, flags: EnumeratorFlags) -> EnumResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if flags.is_descending() {
            ids.reverse();
        }
        debug!(count = ids.len(), flags = flags.bits(), "enumerating documents by id list");
        Ok(Self::new(
            store,
            flags,
            Mode::Ids {
                ids: ids.into_iter(),
            },
        ))
    }

    /// Enumerate documents whose latest change has a sequence greater than
    /// `since`, in ascending sequence order. `DESCENDING` is ignored.
    pub fn changes(store: &'a S, since: Sequence, flags: EnumeratorFlags) -> EnumResult<Self> {
        let metas = store.changes_since(since)?;
        debug!(%since, flags = flags.bits(), "enumerating changes");
        Ok(Self::new(store, flags, Mode::Changes { metas }))
    }

    fn new(store: &'a S, flags: EnumeratorFlags, mode: Mode<'a>) -> Self {
        Self {
            store,
            flags,
            mode: Some(mode),
            state: State::Created,
        }
    }

    /// Flags the iterator was created with.
    pub fn flags(&self) -> EnumeratorFlags {
        self.flags
    }

    /// Move to the next record. Returns `false` once, at the end.
    pub fn advance(&mut self) -> EnumResult<bool> {
        match self.state {
            State::Exhausted => return Err(EnumError::Misuse("advance after end of enumeration")),
            State::Released => return Err(EnumError::Misuse("advance after release")),
            State::Created | State::Positioned(_) => {}
        }
        match self.next_meta() {
            Ok(Some(meta)) => {
                self.state = State::Positioned(meta);
                Ok(true)
            }
            Ok(None) => {
                if let Some(mode) = self.mode.take() {
                    debug!(mode = mode.name(), "enumeration finished");
                }
                self.state = State::Exhausted;
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "enumeration failed; releasing cursor");
                self.release();
                Err(e)
            }
        }
    }

    fn next_meta(&mut self) -> EnumResult<Option<DocumentMeta>> {
        let store = self.store;
        let flags = self.flags;
        let Some(mode) = self.mode.as_mut() else {
            return Err(EnumError::Misuse("cursor already released"));
        };
        match mode {
            Mode::Range { metas, skip } => {
                for meta in metas {
                    let meta = meta?;
                    if !passes_range_filters(flags, meta.flags) {
                        continue;
                    }
                    if *skip > 0 {
                        *skip -= 1;
                        continue;
                    }
                    return Ok(Some(meta));
                }
                Ok(None)
            }
            Mode::Ids { ids } => {
                let Some(id) = ids.next() else {
                    return Ok(None);
                };
                let meta = store.lookup_by_id(&id)?;
                Ok(Some(meta.unwrap_or_else(|| DocumentMeta::not_found(id))))
            }
            Mode::Changes { metas } => {
                for meta in metas {
                    let meta = meta?;
                    if meta.is_deleted() && !flags.includes_deleted() {
                        continue;
                    }
                    return Ok(Some(meta));
                }
                Ok(None)
            }
        }
    }

    /// Metadata of the current record.
    pub fn current_meta(&self) -> EnumResult<&DocumentMeta> {
        match &self.state {
            State::Positioned(meta) => Ok(meta),
            State::Created => Err(EnumError::Misuse("no current record before the first advance")),
            State::Exhausted => Err(EnumError::Misuse("no current record after end of enumeration")),
            State::Released => Err(EnumError::Misuse("no current record after release")),
        }
    }

    /// Id of the current record.
    pub fn current_id(&self) -> EnumResult<&str> {
        Ok(&self.current_meta()?.id)
    }

    /// Revision id of the current record. Empty for a missing id.
    pub fn current_rev_id(&self) -> EnumResult<&str> {
        Ok(&self.current_meta()?.rev_id)
    }

    /// Flags of the current record.
    pub fn current_flags(&self) -> EnumResult<DocumentFlags> {
        Ok(self.current_meta()?.flags)
    }

    /// Sequence of the current record's latest change.
    pub fn current_sequence(&self) -> EnumResult<Sequence> {
        Ok(self.current_meta()?.sequence)
    }

    /// Load the full current document from the store.
    ///
    /// Fails with [`EnumError::NotFound`] for the marker of a missing id, or
    /// when the document was changed after the iterator reached it. The
    /// enumeration itself can continue either way.
    pub fn current_document(&self) -> EnumResult<S::Document> {
        let meta = self.current_meta()?;
        if !meta.exists() {
            return Err(EnumError::NotFound(meta.id.clone()));
        }
        self.store.materialize(meta)
    }

    /// Advance, then load the new current document. `None` at the end.
    pub fn next_document(&mut self) -> EnumResult<Option<S::Document>> {
        if !self.advance()? {
            return Ok(None);
        }
        self.current_document().map(Some)
    }

    /// Free the underlying cursor. Safe to call at any point and more than
    /// once; later calls to anything else fail with [`EnumError::Misuse`].
    pub fn release(&mut self) {
        if let Some(mode) = self.mode.take() {
            debug!(mode = mode.name(), "enumeration released early");
        }
        self.state = State::Released;
    }

    /// Whether the iterator can still be advanced.
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Created | State::Positioned(_))
    }
}

impl<S: DocumentStore + ?Sized> Drop for DocumentIterator<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: DocumentStore + ?Sized> std::fmt::Debug for DocumentIterator<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Created => "created",
            State::Positioned(_) => "positioned",
            State::Exhausted => "exhausted",
            State::Released => "released",
        };
        f.debug_struct("DocumentIterator")
            .field("mode", &self.mode.as_ref().map(Mode::name))
            .field("flags", &self.flags)
            .field("state", &state)
            .finish()
    }
}

fn passes_range_filters(enum_flags: EnumeratorFlags, doc_flags: DocumentFlags) -> bool {
    if doc_flags.contains(DocumentFlags::DELETED) && !enum_flags.includes_deleted() {
        return false;
    }
    if !enum_flags.includes_non_conflicted() && !doc_flags.contains(DocumentFlags::CONFLICTED) {
        return false;
    }
    true
}
