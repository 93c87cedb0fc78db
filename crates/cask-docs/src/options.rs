use std::ops::Bound;

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Options for a [`DocumentIterator`](crate::DocumentIterator).
    ///
    /// Bit values match the enumerator flags hosts already persist.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EnumeratorFlags: u16 {
        /// Enumerate in reverse order.
        const DESCENDING = 0x01;
        /// Include the document named by the start bound.
        const INCLUSIVE_START = 0x02;
        /// Include the document named by the end bound.
        const INCLUSIVE_END = 0x04;
        /// Include deleted documents (tombstones).
        const INCLUDE_DELETED = 0x08;
        /// Include documents without conflicts. Clear it to list only
        /// conflicted documents.
        const INCLUDE_NON_CONFLICTED = 0x10;
    }
}

impl Default for EnumeratorFlags {
    fn default() -> Self {
        Self::INCLUSIVE_START | Self::INCLUSIVE_END | Self::INCLUDE_NON_CONFLICTED
    }
}

impl EnumeratorFlags {
    /// Whether `DESCENDING` is set.
    pub fn is_descending(self) -> bool {
        self.contains(Self::DESCENDING)
    }

    /// Whether tombstones are listed.
    pub fn includes_deleted(self) -> bool {
        self.contains(Self::INCLUDE_DELETED)
    }

    /// Whether documents without conflicts are listed.
    pub fn includes_non_conflicted(self) -> bool {
        self.contains(Self::INCLUDE_NON_CONFLICTED)
    }
}

/// A range of document ids in ascending keyspace order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<String>,
    pub upper: Bound<String>,
}

impl KeyRange {
    /// Every id.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// A range with explicit bounds on both sides.
    pub fn new(lower: Bound<String>, upper: Bound<String>) -> Self {
        Self { lower, upper }
    }

    /// Translate enumerator-style bounds into a keyspace range.
    ///
    /// Enumeration runs from `start` toward `end`, so when `flags` is
    /// descending `start` is the upper bound. `INCLUSIVE_START` and
    /// `INCLUSIVE_END` follow their bound wherever it lands. `None` leaves
    /// that side open.
    pub fn from_enumerator(start: Option<&str>, end: Option<&str>, flags: EnumeratorFlags) -> Self {
        let start = bound(start, flags.contains(EnumeratorFlags::INCLUSIVE_START));
        let end = bound(end, flags.contains(EnumeratorFlags::INCLUSIVE_END));
        if flags.is_descending() {
            Self::new(end, start)
        } else {
            Self::new(start, end)
        }
    }

    /// Whether `id` falls inside the range.
    pub fn contains(&self, id: &str) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => id >= l.as_str(),
            Bound::Excluded(l) => id > l.as_str(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => id <= u.as_str(),
            Bound::Excluded(u) => id < u.as_str(),
            Bound::Unbounded => true,
        };
        above && below
    }

    /// True when the bounds cross, so no id can match.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
                l >= u
            }
            _ => false,
        }
    }

    /// Borrowed bounds, suitable for `BTreeMap::range`.
    pub fn as_bounds(&self) -> (Bound<&str>, Bound<&str>) {
        (borrow(&self.lower), borrow(&self.upper))
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

fn bound(id: Option<&str>, inclusive: bool) -> Bound<String> {
    match id {
        None => Bound::Unbounded,
        Some(id) if inclusive => Bound::Included(id.to_owned()),
        Some(id) => Bound::Excluded(id.to_owned()),
    }
}

fn borrow(b: &Bound<String>) -> Bound<&str> {
    match b {
        Bound::Included(s) => Bound::Included(s.as_str()),
        Bound::Excluded(s) => Bound::Excluded(s.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}
