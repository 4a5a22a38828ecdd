use crate::{BitSet, Id};

/// Set of variable [`Id`]s, used by liveness analysis.
///
/// Only supports ids `>= Id::FIRST`; the backing [`BitSet`] is keyed by
/// `id - Id::FIRST` so a function's first locals sit at the low bits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdSet {
    bits: BitSet,
}

impl IdSet {
    /// Construct an empty set.
    pub const fn new() -> Self {
        Self {
            bits: BitSet::new(),
        }
    }

    /// Number of addressable ids.
    pub const fn len(&self) -> usize {
        self.bits.len()
    }

    /// True if no id is addressable.
    pub const fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Checked membership test; ids out of bounds are absent.
    pub fn contains(&self, id: Id) -> bool {
        match Self::index(id) {
            Some(i) => self.bits.get(i),
            None => false,
        }
    }

    /// Add or remove an id. Does nothing if the id is out of bounds.
    pub fn set(&mut self, id: Id, value: bool) {
        if let Some(i) = Self::index(id) {
            self.bits.set(i, value);
        }
    }

    /// Resize so that every id up to and including `highest` is
    /// addressable. Returns `false` if the backing allocation failed.
    pub fn resize(&mut self, highest: Id) -> bool {
        self.bits.resize(Self::span(highest))
    }

    /// Grow capacity for ids up to `highest` without changing the length.
    /// Returns `false` if the backing allocation failed.
    pub fn reserve(&mut self, highest: Id) -> bool {
        self.bits.reserve(Self::span(highest))
    }

    /// Drop every id, leaving an empty set.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Iterate over the ids present in the set, ascending.
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.bits
            .ones()
            .map(|i| Id::new(i as u32 + Id::FIRST.val()))
    }

    fn index(id: Id) -> Option<usize> {
        id.val().checked_sub(Id::FIRST.val()).map(|i| i as usize)
    }

    fn span(highest: Id) -> usize {
        let val = highest.val().saturating_add(1).max(Id::FIRST.val());
        (val - Id::FIRST.val()) as usize
    }
}
