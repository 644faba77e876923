//! Coordinator Actor - applies host changes on a dedicated thread.
//!
//! This actor owns the engine and the coordinator state machine. It runs the
//! startup scan, then processes `CoordinatorEvent`s one cycle at a time: block
//! for the first event, drain everything else already queued, and do the
//! combined work once. Events queued in the same tick therefore share one
//! flush, and cycles run strictly in delivery order.

use super::coordinator_channel::CoordinatorEvent;
use super::{Coordinator, CoordinatorStats};
use crate::config::Config;
use crate::engine::Engine;
use crate::scanner::ScanStats;
use crate::tree::VisualTree;
use anyhow::{Context, Result};
use log::*;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// What a cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Startup,
    Batch,
    Rescan,
    Reconfigure,
    /// Only ignorable events arrived.
    Idle,
}

/// Sent after every cycle, for drivers and tests that need to wait on the actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub kind: CycleKind,
    /// Events consumed by this cycle.
    pub events: usize,
    pub scan: ScanStats,
    pub totals: CoordinatorStats,
}

/// Work gathered while draining one cycle's events.
#[derive(Default)]
struct PendingCycle {
    events: usize,
    rescan: bool,
    config: Option<Config>,
    shutdown: bool,
}

/// Coordinator actor that runs in a background thread.
pub struct CoordinatorActor {
    thread_handle: Option<JoinHandle<()>>,
}

impl CoordinatorActor {
    /// Spawns the actor, which takes ownership of `engine` and `tree`.
    ///
    /// The thread exits on `CoordinatorEvent::Shutdown` or when every sender
    /// has been dropped. Dropping the actor joins the thread, so send
    /// `Shutdown` (or drop the senders) first.
    pub fn spawn<T>(
        engine: Engine,
        tree: T,
        event_rx: Receiver<CoordinatorEvent>,
        report_tx: Option<Sender<CycleReport>>,
    ) -> Result<Self>
    where
        T: VisualTree + Send + 'static,
    {
        info!("CoordinatorActor: Spawning background thread");

        let thread_handle = thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || {
                if let Err(e) = Self::actor_thread_main(engine, tree, event_rx, report_tx) {
                    error!("CoordinatorActor thread error: {:#}", e);
                }
            })
            .context("Failed to spawn Coordinator actor thread")?;

        Ok(Self {
            thread_handle: Some(thread_handle),
        })
    }

    fn actor_thread_main<T: VisualTree>(
        mut engine: Engine,
        mut tree: T,
        event_rx: Receiver<CoordinatorEvent>,
        report_tx: Option<Sender<CycleReport>>,
    ) -> Result<()> {
        let mut coordinator = Coordinator::new();

        let scan = coordinator.start(&mut engine, &mut tree);
        Self::report(&report_tx, CycleKind::Startup, 0, scan, &coordinator);

        debug!("CoordinatorActor: Starting event loop");
        loop {
            let event = match event_rx.recv() {
                Ok(event) => event,
                Err(_) => {
                    info!("CoordinatorActor: Event channel closed, shutting down");
                    return Ok(());
                }
            };

            let mut cycle = PendingCycle::default();
            Self::process_event(event, &mut coordinator, &mut cycle);

            let mut disconnected = false;
            while !cycle.shutdown {
                match event_rx.try_recv() {
                    Ok(event) => Self::process_event(event, &mut coordinator, &mut cycle),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }

            let (kind, scan) = if let Some(config) = cycle.config.take() {
                (
                    CycleKind::Reconfigure,
                    coordinator.reconfigure(&mut engine, config, &mut tree),
                )
            } else if cycle.rescan {
                (
                    CycleKind::Rescan,
                    coordinator.stylesheet_loaded(&mut engine, &mut tree),
                )
            } else if coordinator.pending().is_empty() {
                (CycleKind::Idle, ScanStats::default())
            } else {
                (CycleKind::Batch, coordinator.flush(&mut engine, &mut tree))
            };
            Self::report(&report_tx, kind, cycle.events, scan, &coordinator);

            if cycle.shutdown {
                info!("CoordinatorActor: Shutdown requested");
                return Ok(());
            }
            if disconnected {
                info!("CoordinatorActor: Event channel disconnected, shutting down");
                return Ok(());
            }
        }
    }

    fn process_event(event: CoordinatorEvent, coordinator: &mut Coordinator, cycle: &mut PendingCycle) {
        cycle.events += 1;
        match event {
            CoordinatorEvent::Mutations(records) => {
                trace!("CoordinatorActor: Received {} mutation records", records.len());
                coordinator.notify(records);
            }
            CoordinatorEvent::StylesheetLoaded => {
                debug!("CoordinatorActor: Received StylesheetLoaded");
                cycle.rescan = true;
            }
            CoordinatorEvent::Reconfigure(config) => {
                debug!("CoordinatorActor: Received Reconfigure");
                cycle.config = Some(*config);
            }
            CoordinatorEvent::Shutdown => {
                cycle.shutdown = true;
            }
        }
    }

    fn report(
        report_tx: &Option<Sender<CycleReport>>,
        kind: CycleKind,
        events: usize,
        scan: ScanStats,
        coordinator: &Coordinator,
    ) {
        if let Some(tx) = report_tx {
            let report = CycleReport {
                kind,
                events,
                scan,
                totals: coordinator.stats(),
            };
            if tx.send(report).is_err() {
                trace!("CoordinatorActor: report receiver gone");
            }
        }
    }
}

impl Drop for CoordinatorActor {
    fn drop(&mut self) {
        debug!("CoordinatorActor dropped");
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                error!("CoordinatorActor thread panicked: {:?}", e);
            }
        }
    }
}
