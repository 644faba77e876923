// src/scanner.rs

//! Finds grey colours on visible elements and writes their replacements.
//!
//! The scanner works element by element. For each tracked attribute it reads the
//! resolved value, turns it into the colour a viewer actually sees (composing
//! translucent values over the effective background), asks the classifier whether
//! that colour is grey, and, when applying, writes the mapper's replacement back
//! through the host tree.
//!
//! Nothing here returns an error to the caller: elements the host cannot
//! resolve are logged and skipped.

use crate::classify::GreyClassifier;
use crate::color::{compose, Color};
use crate::error::TreeError;
use crate::mapper::LuminanceMapper;
use crate::resolve::{effective_background, ColorCache};
use crate::tree::{ColorAttribute, ElementId, TrackedAttributes, VisualTree};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

/// A grey colour found on an element attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: ElementId,
    pub attr: ColorAttribute,
    /// The effective, opaque source colour.
    pub color: Color,
}

/// Counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Elements inspected.
    pub visited: usize,
    /// Elements skipped because they were invisible, detached or unresolvable.
    pub skipped: usize,
    /// Attribute overrides written.
    pub recolored: usize,
}

impl ScanStats {
    pub fn merge(&mut self, other: ScanStats) {
        self.visited += other.visited;
        self.skipped += other.skipped;
        self.recolored += other.recolored;
    }
}

/// An override the engine has written: the original source colour and the
/// replacement that now shadows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedOverride {
    pub source: Color,
    pub written: Color,
}

/// Side table of overrides written by the engine, keyed by element and attribute.
///
/// Every replacement colour written is also remembered on its own. A resolved
/// value equal to one of them is the engine's output showing through, either
/// on the element itself or inherited from an ancestor, and is never mapped
/// again.
#[derive(Debug, Default, Clone)]
pub struct AppliedOverrides {
    entries: HashMap<(ElementId, ColorAttribute), AppliedOverride>,
    emitted: HashSet<u32>,
}

impl AppliedOverrides {
    pub fn get(&self, id: ElementId, attr: ColorAttribute) -> Option<AppliedOverride> {
        self.entries.get(&(id, attr)).copied()
    }

    pub fn record(&mut self, id: ElementId, attr: ColorAttribute, source: Color, written: Color) {
        self.entries
            .insert((id, attr), AppliedOverride { source, written });
        self.emitted.insert(written.key());
    }

    /// True if `color` is an opaque colour the engine has written.
    pub fn is_emitted(&self, color: Color) -> bool {
        color.is_opaque() && self.emitted.contains(&color.key())
    }

    /// Forgets which colours were written, keeping the per-element entries.
    /// Used when the palette changes and old replacements become ordinary colours.
    pub fn forget_emitted(&mut self) {
        self.emitted.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, ColorAttribute, AppliedOverride)> + '_ {
        self.entries
            .iter()
            .map(|((id, attr), applied)| (*id, *attr, *applied))
    }

    pub fn prune_detached<T: VisualTree + ?Sized>(&mut self, tree: &T) {
        self.entries.retain(|(id, _), _| tree.contains(*id));
    }
}

/// Mutable state a scan reads and updates.
pub struct ScanState<'a> {
    pub cache: &'a mut ColorCache,
    pub applied: &'a mut AppliedOverrides,
}

#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    classifier: GreyClassifier,
    tracked: TrackedAttributes,
}

impl Scanner {
    pub fn new(classifier: GreyClassifier, tracked: TrackedAttributes) -> Self {
        Scanner { classifier, tracked }
    }

    pub fn classifier(&self) -> &GreyClassifier {
        &self.classifier
    }

    pub fn tracked(&self) -> TrackedAttributes {
        self.tracked
    }

    /// Lists the grey candidates on a single element.
    ///
    /// Invisible elements yield no candidates. Errors are returned so the caller
    /// can count the element as skipped.
    pub fn inspect<T: VisualTree + ?Sized>(
        &self,
        tree: &T,
        id: ElementId,
        state: &mut ScanState<'_>,
    ) -> Result<Vec<Candidate>, TreeError> {
        if !tree.contains(id) {
            return Err(TreeError::Detached(id));
        }
        if !tree.bounds(id)?.is_visible() {
            trace!("Scanner: {:?} is not visible", id);
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for attr in self.tracked.attributes() {
            let raw = Color::parse(&tree.resolved_color(id, attr)?);
            if raw.is_transparent() {
                continue;
            }
            if state.applied.is_emitted(raw) {
                trace!("Scanner: {:?} {:?} already shows {}", id, attr, raw);
                continue;
            }
            if let Some(applied) = state.applied.get(id, attr) {
                if applied.written == raw {
                    continue;
                }
            }
            let effective = match attr {
                ColorAttribute::Background if raw.is_opaque() => raw,
                ColorAttribute::Background => effective_background(tree, id, state.cache),
                _ if raw.is_opaque() => raw,
                _ => compose(raw, effective_background(tree, id, state.cache)).opaque(),
            };
            if let Some(grey) = self.classifier.classify(effective) {
                found.push(Candidate {
                    id,
                    attr,
                    color: grey,
                });
            }
        }
        Ok(found)
    }

    /// Collects candidates from every element in `ids` without writing anything.
    pub fn collect_candidates<T, I>(
        &self,
        tree: &T,
        ids: I,
        state: &mut ScanState<'_>,
        stats: &mut ScanStats,
    ) -> Vec<Candidate>
    where
        T: VisualTree + ?Sized,
        I: IntoIterator<Item = ElementId>,
    {
        let mut candidates = Vec::new();
        for id in ids {
            stats.visited += 1;
            match self.inspect(tree, id, state) {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    debug!("Scanner: skipping element: {}", e);
                    stats.skipped += 1;
                }
            }
        }
        candidates
    }

    /// Maps and writes each candidate. Failed writes are logged and skipped.
    ///
    /// A background write drops only the element's own cache entry. Callers
    /// that have cached effective colours for its descendants must invalidate
    /// those themselves.
    pub fn apply<T: VisualTree + ?Sized>(
        &self,
        tree: &mut T,
        mapper: &mut LuminanceMapper,
        candidates: &[Candidate],
        state: &mut ScanState<'_>,
        stats: &mut ScanStats,
    ) {
        for candidate in candidates {
            let replacement = mapper.map(candidate.color);
            match tree.set_color(candidate.id, candidate.attr, replacement) {
                Ok(()) => {
                    state
                        .applied
                        .record(candidate.id, candidate.attr, candidate.color, replacement);
                    if candidate.attr == ColorAttribute::Background {
                        state.cache.remove(candidate.id);
                    }
                    stats.recolored += 1;
                }
                Err(e) => {
                    debug!("Scanner: could not write override: {}", e);
                }
            }
        }
    }

    /// Inspects and recolours each element in turn, so descendants see their
    /// ancestors' new backgrounds.
    ///
    /// `ids` must list ancestors before descendants, and no element in it may
    /// have a stale cache entry when the pass starts.
    pub fn scan_and_apply<T, I>(
        &self,
        tree: &mut T,
        mapper: &mut LuminanceMapper,
        ids: I,
        state: &mut ScanState<'_>,
    ) -> ScanStats
    where
        T: VisualTree + ?Sized,
        I: IntoIterator<Item = ElementId>,
    {
        let mut stats = ScanStats::default();
        for id in ids {
            stats.visited += 1;
            match self.inspect(tree, id, state) {
                Ok(found) => self.apply(tree, mapper, &found, state, &mut stats),
                Err(e) => {
                    debug!("Scanner: skipping element: {}", e);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::MappingPolicy;
    use crate::palette::Palette;
    use crate::tree::memory::{MemoryTree, NodeSpec};
    use crate::tree::Bounds;
    use test_log::test;

    struct Fixture {
        cache: ColorCache,
        applied: AppliedOverrides,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                cache: ColorCache::new(),
                applied: AppliedOverrides::default(),
            }
        }

        fn state(&mut self) -> ScanState<'_> {
            ScanState {
                cache: &mut self.cache,
                applied: &mut self.applied,
            }
        }
    }

    fn scanner() -> Scanner {
        Scanner::new(GreyClassifier::new(10), TrackedAttributes::all())
    }

    fn mapper() -> LuminanceMapper {
        LuminanceMapper::new(Palette::builtin(0.2), MappingPolicy::Direct, [])
    }

    #[test]
    fn finds_grey_attributes_only() {
        let tree = MemoryTree::new(
            NodeSpec::new("body")
                .with_style("background-color", "rgb(128, 128, 128)")
                .with_style("color", "rgb(200, 30, 30)")
                .with_style("border-color", "rgb(10, 10, 10)"),
        );
        let mut fx = Fixture::new();
        let found = scanner()
            .inspect(&tree, tree.root().unwrap(), &mut fx.state())
            .unwrap();
        let attrs: Vec<_> = found.iter().map(|c| c.attr).collect();
        assert_eq!(attrs, vec![ColorAttribute::Background, ColorAttribute::Border]);
    }

    #[test]
    fn invisible_elements_are_ignored() {
        let mut tree = MemoryTree::new(
            NodeSpec::new("body").with_style("background-color", "rgb(128, 128, 128)"),
        );
        let root = tree.root().unwrap();
        tree.set_bounds(
            root,
            Bounds {
                width: 0.0,
                ..Bounds::default()
            },
        );
        let mut fx = Fixture::new();
        assert!(scanner().inspect(&tree, root, &mut fx.state()).unwrap().is_empty());
    }

    #[test]
    fn unparseable_values_are_treated_as_white() {
        let tree = MemoryTree::new(
            NodeSpec::new("body")
                .with_style("background-color", "not-a-colour")
                .with_style("color", "rgb(200, 0, 0)"),
        );
        let mut fx = Fixture::new();
        let found = scanner()
            .inspect(&tree, tree.root().unwrap(), &mut fx.state())
            .unwrap();
        assert_eq!(found[0].color, crate::color::WHITE);
    }

    #[test]
    fn translucent_foreground_is_composed_over_background() {
        let tree = MemoryTree::new(
            NodeSpec::new("body")
                .with_style("background-color", "rgb(200, 200, 200)")
                .with_style("color", "rgba(0, 0, 0, 0.5)")
                .with_style("border-color", "transparent"),
        );
        let mut fx = Fixture::new();
        let found = scanner()
            .inspect(&tree, tree.root().unwrap(), &mut fx.state())
            .unwrap();
        assert_eq!(found[1].attr, ColorAttribute::Foreground);
        assert_eq!(found[1].color, Color::rgb(100, 100, 100));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn unresolvable_elements_are_skipped_not_fatal() {
        let mut tree = MemoryTree::new(
            NodeSpec::new("body")
                .with_child(NodeSpec::new("a").with_style("color", "rgb(50, 50, 50)"))
                .with_child(NodeSpec::new("b").with_style("color", "rgb(60, 60, 60)")),
        );
        let a = tree.find_by_tag("a").unwrap();
        let b = tree.find_by_tag("b").unwrap();
        tree.set_unresolvable(a, true);

        let mut fx = Fixture::new();
        let mut mapper = mapper();
        let stats = scanner().scan_and_apply(&mut tree, &mut mapper, [a, b], &mut fx.state());
        assert_eq!(stats.skipped, 1);
        assert!(tree.override_of(b, ColorAttribute::Foreground).is_some());
        assert!(tree.override_of(a, ColorAttribute::Foreground).is_none());
    }

    #[test]
    fn own_overrides_are_not_remapped() {
        let mut tree = MemoryTree::new(
            NodeSpec::new("body").with_style("background-color", "rgb(128, 128, 128)"),
        );
        let root = tree.root().unwrap();
        let mut fx = Fixture::new();
        let mut mapper = mapper();
        let scanner = Scanner::new(GreyClassifier::new(10), TrackedAttributes::BACKGROUND);

        let first = scanner.scan_and_apply(&mut tree, &mut mapper, [root], &mut fx.state());
        let second = scanner.scan_and_apply(&mut tree, &mut mapper, [root], &mut fx.state());
        assert_eq!(first.recolored, 1);
        assert_eq!(second.recolored, 0);
        assert_eq!(
            fx.applied.get(root, ColorAttribute::Background).unwrap().source,
            Color::rgb(128, 128, 128)
        );
    }

    #[test]
    fn background_write_drops_only_its_own_cache_entry() {
        let mut tree = MemoryTree::new(
            NodeSpec::new("body")
                .with_style("background-color", "rgb(128, 128, 128)")
                .with_child(NodeSpec::new("div").with_style("background-color", "rgba(0, 0, 0, 0.5)")),
        );
        let root = tree.root().unwrap();
        let div = tree.find_by_tag("div").unwrap();
        let mut fx = Fixture::new();
        let mut mapper = mapper();
        effective_background(&tree, div, &mut fx.cache);
        assert!(fx.cache.get(root).is_some());

        scanner().scan_and_apply(&mut tree, &mut mapper, [root], &mut fx.state());
        assert!(fx.cache.get(root).is_none());
        assert!(fx.cache.get(div).is_some());
    }

    #[test]
    fn inherited_replacements_are_left_alone() {
        let mut tree = MemoryTree::new(
            NodeSpec::new("body")
                .with_style("background-color", "rgb(255, 255, 255)")
                .with_style("color", "rgb(75, 75, 75)")
                .with_child(NodeSpec::new("p")),
        );
        let body = tree.root().unwrap();
        let p = tree.find_by_tag("p").unwrap();
        let mut fx = Fixture::new();
        let mut mapper = LuminanceMapper::new(
            Palette::builtin(0.2),
            MappingPolicy::RangeRemapped,
            [Color::rgb(5, 5, 5), Color::rgb(75, 75, 75), Color::rgb(255, 255, 255)],
        );
        let scanner = Scanner::new(GreyClassifier::new(20), TrackedAttributes::FOREGROUND);

        scanner.scan_and_apply(&mut tree, &mut mapper, [body], &mut fx.state());
        let written = tree.override_of(body, ColorAttribute::Foreground).unwrap();
        assert!(fx.applied.is_emitted(written));

        let stats = scanner.scan_and_apply(&mut tree, &mut mapper, [p], &mut fx.state());
        assert_eq!(stats.recolored, 0);
        assert!(tree.override_of(p, ColorAttribute::Foreground).is_none());
        assert_eq!(
            Color::parse(&tree.resolved_color(p, ColorAttribute::Foreground).unwrap()),
            written
        );
    }
}
