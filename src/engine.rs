// src/engine.rs

//! The recolouring engine.
//!
//! `Engine` is the single owner of everything a recolouring pass needs: the
//! configuration, the extended palette, the memoized mapping, the effective
//! colour cache and the record of overrides already written. There is no global
//! state; whoever drives the engine (the coordinator, a test, the demo binary)
//! owns it and hands it a tree to work on.

use crate::classify::GreyClassifier;
use crate::config::Config;
use crate::mapper::LuminanceMapper;
use crate::palette::Palette;
use crate::resolve::{is_dark, ColorCache};
use crate::scanner::{AppliedOverrides, ScanState, ScanStats, Scanner};
use crate::tree::{ElementId, VisualTree};
use log::{debug, info, warn};
use std::time::Instant;

/// Configuration the engine is built from.
pub type EngineConfig = Config;

pub struct Engine {
    config: EngineConfig,
    palette: Palette,
    mapper: Option<LuminanceMapper>,
    scanner: Scanner,
    cache: ColorCache,
    applied: AppliedOverrides,
    /// Set when the startup scan found a dark tree and `skip_dark_trees` is on.
    dormant: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, palette: Palette) -> Self {
        let scanner = Scanner::new(
            GreyClassifier::new(config.classifier.tolerance),
            config.scan.tracked,
        );
        info!(
            "Engine: {} palette entries, tolerance {}, {:?} policy",
            palette.len(),
            config.classifier.tolerance,
            config.mapping.policy
        );
        Engine {
            config,
            palette,
            mapper: None,
            scanner,
            cache: ColorCache::new(),
            applied: AppliedOverrides::default(),
            dormant: false,
        }
    }

    /// Builds the palette described by `config` and an engine around it.
    pub fn from_config(config: EngineConfig) -> Self {
        let palette = config.palette.build();
        Self::new(config, palette)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The mapping built so far, if the engine has started.
    pub fn mapping(&self) -> Option<&LuminanceMapper> {
        self.mapper.as_ref()
    }

    pub fn applied(&self) -> &AppliedOverrides {
        &self.applied
    }

    pub fn cache(&self) -> &ColorCache {
        &self.cache
    }

    /// False when the engine declined to recolour a dark tree.
    pub fn is_active(&self) -> bool {
        !self.dormant
    }

    /// Full-tree scan: collect every grey in use, build the mapping from them,
    /// then write replacements.
    pub fn start<T: VisualTree + ?Sized>(&mut self, tree: &mut T) -> ScanStats {
        let mut stats = ScanStats::default();
        let Some(root) = tree.root() else {
            warn!("Engine: tree has no root, nothing to scan");
            return stats;
        };

        let t0 = Instant::now();
        let dark = is_dark(tree, &mut self.cache);
        info!("Engine: tree is {}", if dark { "dark" } else { "light" });
        if dark && self.config.scan.skip_dark_trees {
            info!("Engine: skipping already-dark tree");
            self.dormant = true;
            return stats;
        }
        self.dormant = false;
        debug!("Brightness check took {:?}", t0.elapsed());

        let t0 = Instant::now();
        let ids = tree.subtree(root);
        let mut state = ScanState {
            cache: &mut self.cache,
            applied: &mut self.applied,
        };
        let candidates = self
            .scanner
            .collect_candidates(tree, ids, &mut state, &mut stats);
        info!(
            "Grey extraction took {:?} ({} candidates on {} elements)",
            t0.elapsed(),
            candidates.len(),
            stats.visited
        );

        let t0 = Instant::now();
        let mut mapper = LuminanceMapper::new(
            self.palette.clone(),
            self.config.mapping.policy,
            candidates.iter().map(|c| c.color),
        );
        info!(
            "Mapping construction took {:?} ({} source colours)",
            t0.elapsed(),
            mapper.len()
        );

        let t0 = Instant::now();
        self.scanner
            .apply(tree, &mut mapper, &candidates, &mut state, &mut stats);
        // Effective colours cached during collection predate the new backgrounds.
        self.cache.clear();
        info!(
            "Recolouring took {:?} ({} overrides)",
            t0.elapsed(),
            stats.recolored
        );

        self.mapper = Some(mapper);
        stats
    }

    /// Scans exactly `ids`, in the given order.
    ///
    /// The caller provides a deduplicated set with ancestors before
    /// descendants, holding every descendant of each element it contains.
    /// Colours not yet in the mapping are added on demand.
    pub fn apply_roots<T: VisualTree + ?Sized>(&mut self, tree: &mut T, ids: &[ElementId]) -> ScanStats {
        if self.dormant {
            return ScanStats::default();
        }
        for id in ids {
            self.cache.remove(*id);
        }
        let mapper = self.mapper.get_or_insert_with(|| {
            LuminanceMapper::new(self.palette.clone(), self.config.mapping.policy, [])
        });
        let mut state = ScanState {
            cache: &mut self.cache,
            applied: &mut self.applied,
        };
        let stats = self
            .scanner
            .scan_and_apply(tree, mapper, ids.iter().copied(), &mut state);
        debug!("Engine: applied to {} elements: {:?}", ids.len(), stats);
        stats
    }

    /// Clears the cache and rescans the whole tree against the existing mapping.
    pub fn rescan_all<T: VisualTree + ?Sized>(&mut self, tree: &mut T) -> ScanStats {
        self.cache.clear();
        self.applied.prune_detached(tree);
        let Some(root) = tree.root() else {
            return ScanStats::default();
        };
        let ids = tree.subtree(root);
        let stats = self.apply_roots(tree, &ids);
        info!("Engine: full rescan: {:?}", stats);
        stats
    }

    /// Replaces configuration and palette, rebuilds the mapping and rescans.
    ///
    /// Elements already recoloured are rewritten from their original source
    /// colours, so they move onto the new palette as well.
    pub fn reload<T: VisualTree + ?Sized>(
        &mut self,
        config: EngineConfig,
        palette: Palette,
        tree: &mut T,
    ) -> ScanStats {
        info!("Engine: reloading with {} palette entries", palette.len());
        self.scanner = Scanner::new(
            GreyClassifier::new(config.classifier.tolerance),
            config.scan.tracked,
        );
        self.config = config;
        self.palette = palette;
        self.dormant = false;
        self.applied.prune_detached(tree);

        let mut mapper = LuminanceMapper::new(
            self.palette.clone(),
            self.config.mapping.policy,
            self.applied.iter().map(|(_, _, applied)| applied.source),
        );

        // Old replacements are ordinary colours from now on. Every override is
        // rewritten, including attributes no longer tracked.
        self.applied.forget_emitted();
        let mut rewritten = 0;
        let previous: Vec<_> = self.applied.iter().collect();
        for (id, attr, applied) in previous {
            let replacement = mapper.map(applied.source);
            match tree.set_color(id, attr, replacement) {
                Ok(()) => {
                    self.applied.record(id, attr, applied.source, replacement);
                    rewritten += 1;
                }
                Err(e) => debug!("Engine: could not rewrite override: {}", e),
            }
        }
        debug!("Engine: rewrote {} existing overrides", rewritten);

        self.mapper = Some(mapper);
        let mut stats = self.rescan_all(tree);
        stats.recolored += rewritten;
        stats
    }

    /// Drops side-table entries for elements that have left the tree.
    pub fn forget_detached<T: VisualTree + ?Sized>(&mut self, tree: &T) {
        self.cache.prune_detached(tree);
        self.applied.prune_detached(tree);
    }

    /// Marks the effective colours under `id` as stale.
    pub fn invalidate<T: VisualTree + ?Sized>(&mut self, tree: &T, id: ElementId) {
        self.cache.invalidate_subtree(tree, id);
    }
}
