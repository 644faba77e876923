// src/coordinator/batch.rs

//! Accumulates the roots touched by host mutations between flushes.

use crate::tree::{ElementId, VisualTree};
use std::collections::HashSet;

/// The set of subtree roots awaiting a scan.
///
/// Roots are deduplicated by id on insertion. Ordering and subtree expansion
/// happen in `prepare`, against the tree as it is at flush time.
#[derive(Debug, Default, Clone)]
pub struct MutationBatch {
    roots: Vec<ElementId>,
    seen: HashSet<ElementId>,
    removals: usize,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root. Returns false if it was already pending.
    pub fn add_root(&mut self, id: ElementId) -> bool {
        if self.seen.insert(id) {
            self.roots.push(id);
            true
        } else {
            false
        }
    }

    pub fn note_removal(&mut self) {
        self.removals += 1;
    }

    pub fn has_removals(&self) -> bool {
        self.removals > 0
    }

    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.removals == 0
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.seen.clear();
        self.removals = 0;
    }

    /// Turns the pending roots into the ordered element set to scan, and
    /// empties the batch.
    ///
    /// Roots no longer in the tree are dropped. The rest are sorted into
    /// document order and each is expanded into itself plus its descendants.
    /// An element reachable from several roots appears once, and ancestors
    /// always precede their descendants.
    pub fn prepare<T: VisualTree + ?Sized>(&mut self, tree: &T) -> Vec<ElementId> {
        let mut roots: Vec<ElementId> = self
            .roots
            .drain(..)
            .filter(|id| tree.contains(*id))
            .collect();
        self.clear();

        roots.sort_by(|a, b| tree.compare_document_order(*a, *b));

        let mut expanded = Vec::new();
        let mut included = HashSet::new();
        for root in roots {
            if included.contains(&root) {
                continue;
            }
            for id in tree.subtree(root) {
                if included.insert(id) {
                    expanded.push(id);
                }
            }
        }
        expanded
    }
}
