use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use cask_types::{DocumentFlags, DocumentMeta, Sequence};

use crate::error::{EnumError, EnumResult};
use crate::options::KeyRange;
use crate::traits::{DocumentStore, MetaIter};

/// A document as held by [`InMemoryDocumentStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDocument {
    pub meta: DocumentMeta,
    /// Current revision body. Empty for tombstones.
    pub body: Vec<u8>,
}

/// In-memory, `BTreeMap`-based document store for tests and embedding.
///
/// Documents are kept in id order behind a `RwLock`. Every `put` and
/// `delete` assigns the next sequence number. Enumeration hands out
/// metadata snapshots; bodies are only cloned by
/// [`DocumentStore::materialize`], which is counted.
pub struct InMemoryDocumentStore {
    inner: RwLock<DocState>,
    materialized: AtomicUsize,
}

#[derive(Default)]
struct DocState {
    docs: BTreeMap<String, StoredDocument>,
    last_sequence: Sequence,
}

impl DocState {
    fn next_sequence(&self) -> EnumResult<Sequence> {
        self.last_sequence
            .checked_next()
            .ok_or_else(|| EnumError::Store("sequence space exhausted".into()))
    }
}

impl InMemoryDocumentStore {
    /// An empty store with no sequence assigned yet.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DocState::default()),
            materialized: AtomicUsize::new(0),
        }
    }

    /// Create or replace a document. Returns the sequence assigned to it.
    pub fn put(
        &self,
        id: impl Into<String>,
        rev_id: impl Into<String>,
        body: impl Into<Vec<u8>>,
        flags: DocumentFlags,
    ) -> EnumResult<Sequence> {
        let mut state = self.inner.write().expect("lock poisoned");
        let sequence = state.next_sequence()?;
        state.last_sequence = sequence;
        let meta = DocumentMeta::new(id, rev_id, flags, sequence);
        state.docs.insert(
            meta.id.clone(),
            StoredDocument {
                meta,
                body: body.into(),
            },
        );
        Ok(sequence)
    }

    /// Replace a document with a tombstone revision. The document keeps its
    /// place in the keyspace and shows up in change feeds with `DELETED` set.
    pub fn delete(&self, id: &str, rev_id: impl Into<String>) -> EnumResult<Sequence> {
        let mut state = self.inner.write().expect("lock poisoned");
        let sequence = state.next_sequence()?;
        let doc = state
            .docs
            .get_mut(id)
            .ok_or_else(|| EnumError::NotFound(id.to_string()))?;
        doc.meta.rev_id = rev_id.into();
        doc.meta.flags |= DocumentFlags::DELETED;
        doc.meta.sequence = sequence;
        doc.body.clear();
        state.last_sequence = sequence;
        Ok(sequence)
    }

    /// Read a document without counting it as a materialization.
    pub fn get(&self, id: &str) -> Option<StoredDocument> {
        self.inner.read().expect("lock poisoned").docs.get(id).cloned()
    }

    /// Sequence of the most recent mutation, or `Sequence::NONE`.
    pub fn last_sequence(&self) -> Sequence {
        self.inner.read().expect("lock poisoned").last_sequence
    }

    /// Number of documents, tombstones included.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").docs.len()
    }

    /// Whether the store holds no documents at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times a body has been materialized.
    pub fn materialize_count(&self) -> usize {
        self.materialized.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    type Document = StoredDocument;

    fn lookup_by_id(&self, id: &str) -> EnumResult<Option<DocumentMeta>> {
        let state = self.inner.read().expect("lock poisoned");
        Ok(state.docs.get(id).map(|doc| doc.meta.clone()))
    }

    fn scan(&self, range: &KeyRange, descending: bool) -> EnumResult<MetaIter<'_>> {
        if range.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let state = self.inner.read().expect("lock poisoned");
        let mut metas: Vec<DocumentMeta> = state
            .docs
            .range::<str, _>(range.as_bounds())
            .map(|(_, doc)| doc.meta.clone())
            .collect();
        if descending {
            metas.reverse();
        }
        Ok(Box::new(metas.into_iter().map(Ok)))
    }

    fn changes_since(&self, since: Sequence) -> EnumResult<MetaIter<'_>> {
        let state = self.inner.read().expect("lock poisoned");
        let mut metas: Vec<DocumentMeta> = state
            .docs
            .values()
            .filter(|doc| doc.meta.sequence > since)
            .map(|doc| doc.meta.clone())
            .collect();
        metas.sort_by_key(|meta| meta.sequence);
        Ok(Box::new(metas.into_iter().map(Ok)))
    }

    fn materialize(&self, meta: &DocumentMeta) -> EnumResult<StoredDocument> {
        let state = self.inner.read().expect("lock poisoned");
        let doc = state
            .docs
            .get(&meta.id)
            .filter(|doc| doc.meta.sequence == meta.sequence)
            .cloned()
            .ok_or_else(|| EnumError::NotFound(meta.id.clone()))?;
        self.materialized.fetch_add(1, Ordering::Relaxed);
        Ok(doc)
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("document_count", &self.len())
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}
