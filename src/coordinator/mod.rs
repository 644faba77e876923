// src/coordinator/mod.rs

//! Incremental updates.
//!
//! The coordinator turns host change notifications into engine work. Records
//! arriving between flushes are folded into one `MutationBatch`; a flush then
//! scans each affected subtree exactly once, ancestors first. A stylesheet load
//! bypasses batching and rescans the whole tree.

pub mod batch;
pub mod coordinator_actor;
pub mod coordinator_channel;

pub use batch::MutationBatch;
pub use coordinator_actor::{CoordinatorActor, CycleKind, CycleReport};
pub use coordinator_channel::{create_coordinator_channel, CoordinatorEvent, CoordinatorSender};


use crate::config::Config;
use crate::engine::Engine;
use crate::scanner::ScanStats;
use crate::tree::{ColorAttribute, MutationRecord, VisualTree};
use log::{debug, trace};

/// Attribute names, besides the colour properties themselves, whose changes
/// can alter a resolved colour.
pub const STYLE_ATTRIBUTES: [&str; 2] = ["style", "class"];

/// True when a change to attribute `name` may affect colours.
pub fn is_color_relevant(name: &str) -> bool {
    STYLE_ATTRIBUTES.contains(&name) || ColorAttribute::from_css_name(name).is_some()
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum CoordinatorState {
    /// Nothing pending.
    #[default]
    Idle,
    /// Roots are pending and waiting for a flush.
    Batching,
    /// A flush or rescan is running.
    Applying,
}

/// Running totals over the coordinator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub startups: usize,
    pub batches: usize,
    pub rescans: usize,
    pub reconfigurations: usize,
    /// Elements scanned by batches.
    pub scanned: usize,
    pub recolored: usize,
}

impl CoordinatorStats {
    fn record(&mut self, scan: &ScanStats) {
        self.scanned += scan.visited;
        self.recolored += scan.recolored;
    }
}

#[derive(Debug, Default)]
pub struct Coordinator {
    state: CoordinatorState,
    batch: MutationBatch,
    stats: CoordinatorStats,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn pending(&self) -> &MutationBatch {
        &self.batch
    }

    /// Runs the engine's startup scan.
    pub fn start<T: VisualTree + ?Sized>(&mut self, engine: &mut Engine, tree: &mut T) -> ScanStats {
        self.state = CoordinatorState::Applying;
        let scan = engine.start(tree);
        self.stats.startups += 1;
        self.stats.recolored += scan.recolored;
        self.state = CoordinatorState::Idle;
        scan
    }

    /// Records change notifications. Returns true if any of them scheduled work.
    pub fn notify<I>(&mut self, records: I) -> bool
    where
        I: IntoIterator<Item = MutationRecord>,
    {
        let mut scheduled = false;
        for record in records {
            match record {
                MutationRecord::ChildList { added, removed } => {
                    for id in added {
                        self.batch.add_root(id);
                        scheduled = true;
                    }
                    if !removed.is_empty() {
                        self.batch.note_removal();
                        scheduled = true;
                    }
                }
                MutationRecord::Attribute { target, name } => {
                    if is_color_relevant(&name) {
                        self.batch.add_root(target);
                        scheduled = true;
                    } else {
                        trace!("Coordinator: ignoring change to '{}' on {:?}", name, target);
                    }
                }
            }
        }
        if scheduled && self.state == CoordinatorState::Idle {
            self.state = CoordinatorState::Batching;
        }
        scheduled
    }

    /// Applies the pending batch. Always leaves the coordinator idle.
    pub fn flush<T: VisualTree + ?Sized>(&mut self, engine: &mut Engine, tree: &mut T) -> ScanStats {
        if self.state != CoordinatorState::Batching {
            return ScanStats::default();
        }
        self.state = CoordinatorState::Applying;

        if self.batch.has_removals() {
            engine.forget_detached(tree);
        }
        let pending = self.batch.len();
        let ids = self.batch.prepare(tree);
        let scan = if ids.is_empty() {
            ScanStats::default()
        } else {
            engine.apply_roots(tree, &ids)
        };
        debug!(
            "Coordinator: batch of {} roots expanded to {} elements: {:?}",
            pending,
            ids.len(),
            scan
        );

        self.stats.batches += 1;
        self.stats.record(&scan);
        self.state = CoordinatorState::Idle;
        scan
    }

    /// Full rescan after a stylesheet load. Any pending batch is subsumed.
    pub fn stylesheet_loaded<T: VisualTree + ?Sized>(&mut self, engine: &mut Engine, tree: &mut T) -> ScanStats {
        self.state = CoordinatorState::Applying;
        self.batch.clear();
        engine.forget_detached(tree);
        let scan = engine.rescan_all(tree);
        self.stats.rescans += 1;
        self.stats.record(&scan);
        self.state = CoordinatorState::Idle;
        scan
    }

    /// Rebuilds the engine from `config` and rescans. Any pending batch is subsumed.
    pub fn reconfigure<T: VisualTree + ?Sized>(
        &mut self,
        engine: &mut Engine,
        config: Config,
        tree: &mut T,
    ) -> ScanStats {
        self.state = CoordinatorState::Applying;
        self.batch.clear();
        let palette = config.palette.build();
        let scan = engine.reload(config, palette, tree);
        self.stats.reconfigurations += 1;
        self.stats.record(&scan);
        self.state = CoordinatorState::Idle;
        scan
    }
}
