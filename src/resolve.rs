// src/resolve.rs

//! Effective colour resolution.
//!
//! A resolved background may be partially or fully transparent, in which case
//! what is actually rendered depends on the element's ancestors. This module
//! composes an element's background over its ancestor chain to get the opaque
//! colour a viewer sees, memoizing results in a side table keyed by element id.

use crate::color::{compose, Color, TRANSPARENT, WHITE};
use crate::tree::{ColorAttribute, ElementId, VisualTree};
use log::{debug, trace};
use std::collections::HashMap;

/// Brightness below which the median sample makes a tree count as dark.
pub const DARK_BRIGHTNESS_THRESHOLD: f64 = 128.0;

/// Side table of effective backgrounds.
///
/// Holds only ids, never elements. Entries must be invalidated whenever a
/// background on the element or any ancestor may have changed.
#[derive(Debug, Default, Clone)]
pub struct ColorCache {
    entries: HashMap<ElementId, Color>,
}

impl ColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ElementId) -> Option<Color> {
        self.entries.get(&id).copied()
    }

    pub fn insert(&mut self, id: ElementId, color: Color) {
        self.entries.insert(id, color);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops the entry for `id` alone.
    pub fn remove(&mut self, id: ElementId) {
        self.entries.remove(&id);
    }

    /// Drops the entry for `id` and for every descendant still in the tree.
    pub fn invalidate_subtree<T: VisualTree + ?Sized>(&mut self, tree: &T, id: ElementId) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.remove(&id);
        for descendant in tree.subtree(id) {
            self.entries.remove(&descendant);
        }
    }

    /// Drops entries for elements that have left the tree.
    pub fn prune_detached<T: VisualTree + ?Sized>(&mut self, tree: &T) {
        let before = self.entries.len();
        self.entries.retain(|id, _| tree.contains(*id));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            trace!("ColorCache: pruned {} detached entries", pruned);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Reads and parses `attr` on `id`. Query failures count as transparent,
/// unparseable values as white.
pub fn read_color<T: VisualTree + ?Sized>(tree: &T, id: ElementId, attr: ColorAttribute) -> Color {
    match tree.resolved_color(id, attr) {
        Ok(value) => Color::parse(&value),
        Err(e) => {
            debug!("resolve: {}", e);
            TRANSPARENT
        }
    }
}

/// The opaque background actually rendered behind `id`.
///
/// Walks up the ancestor chain until it reaches an opaque background, a cached
/// result, or the root. Fully transparent layers defer to their parent and
/// partially transparent layers are composed over it. Above the root the
/// backdrop is opaque white.
pub fn effective_background<T: VisualTree + ?Sized>(
    tree: &T,
    id: ElementId,
    cache: &mut ColorCache,
) -> Color {
    let mut chain: Vec<(ElementId, Color)> = Vec::new();
    let mut backdrop = WHITE;
    let mut current = Some(id);

    while let Some(el) = current {
        if let Some(cached) = cache.get(el) {
            backdrop = cached;
            break;
        }
        let color = read_color(tree, el, ColorAttribute::Background);
        chain.push((el, color));
        if color.is_opaque() {
            break;
        }
        current = tree.parent(el);
    }

    let mut acc = backdrop;
    for (el, color) in chain.into_iter().rev() {
        acc = if color.is_opaque() {
            color
        } else if color.is_transparent() {
            acc
        } else {
            compose(color, acc).opaque()
        };
        cache.insert(el, acc);
    }
    acc
}

/// Median of `values`, or `None` when empty. Sorts in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Median perceived brightness of the effective backgrounds of all visible
/// elements under `root`.
pub fn median_brightness<T: VisualTree + ?Sized>(
    tree: &T,
    root: ElementId,
    cache: &mut ColorCache,
) -> Option<f64> {
    let mut samples: Vec<f64> = tree
        .subtree(root)
        .into_iter()
        .filter(|id| tree.bounds(*id).map(|b| b.is_visible()).unwrap_or(false))
        .map(|id| effective_background(tree, id, cache).brightness())
        .collect();
    median(&mut samples)
}

/// True when the tree's median background brightness is below the dark threshold.
pub fn is_dark<T: VisualTree + ?Sized>(tree: &T, cache: &mut ColorCache) -> bool {
    let Some(root) = tree.root() else {
        return false;
    };
    match median_brightness(tree, root, cache) {
        Some(brightness) => {
            debug!("resolve: median background brightness {:.1}", brightness);
            brightness < DARK_BRIGHTNESS_THRESHOLD
        }
        None => false,
    }
}
