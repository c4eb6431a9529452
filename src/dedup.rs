//! Deduplication of reference windows within a scoring batch

use crate::{Sequence, Window};
use std::collections::HashMap;

/// Insertion-ordered map from reference window content to a dense index.
///
/// Keys are the bases only; two windows with identical bases but different
/// offsets share one index and are scored once.
#[derive(Debug, Default)]
pub struct ReferenceDedupCache {
    index: HashMap<Sequence, usize>,
    references: Vec<Sequence>,
}

impl ReferenceDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the window's bases, assigning the next index on first sight
    pub fn intern(&mut self, window: &Window) -> usize {
        self.intern_sequence(&window.bases)
    }

    pub fn intern_sequence(&mut self, bases: &Sequence) -> usize {
        if let Some(&idx) = self.index.get(bases) {
            return idx;
        }
        let idx = self.references.len();
        self.references.push(bases.clone());
        self.index.insert(bases.clone(), idx);
        idx
    }

    pub fn get(&self, idx: usize) -> Option<&Sequence> {
        self.references.get(idx)
    }

    /// Distinct references in first-seen order
    pub fn references(&self) -> &[Sequence] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
