// src/coordinator/coordinator_channel.rs
//!
//! Event channel into the coordinator actor.

use crate::config::Config;
use crate::tree::MutationRecord;
use std::sync::mpsc::{self, Receiver, SendError, Sender};

/// Everything the coordinator actor can be told.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Change records delivered by the host, in the order they happened.
    Mutations(Vec<MutationRecord>),
    /// An external stylesheet finished loading; cascaded values may have changed anywhere.
    StylesheetLoaded,
    /// New configuration, e.g. after a settings change.
    Reconfigure(Box<Config>),
    Shutdown,
}

impl From<Vec<MutationRecord>> for CoordinatorEvent {
    fn from(records: Vec<MutationRecord>) -> Self {
        CoordinatorEvent::Mutations(records)
    }
}

impl From<MutationRecord> for CoordinatorEvent {
    fn from(record: MutationRecord) -> Self {
        CoordinatorEvent::Mutations(vec![record])
    }
}

impl From<Config> for CoordinatorEvent {
    fn from(config: Config) -> Self {
        CoordinatorEvent::Reconfigure(Box::new(config))
    }
}

/// Cloneable sender that converts into `CoordinatorEvent` on the way in.
#[derive(Clone, Debug)]
pub struct CoordinatorSender {
    tx: Sender<CoordinatorEvent>,
}

impl CoordinatorSender {
    pub fn new(tx: Sender<CoordinatorEvent>) -> Self {
        Self { tx }
    }

    pub fn send<T>(&self, msg: T) -> Result<(), SendError<CoordinatorEvent>>
    where
        CoordinatorEvent: From<T>,
    {
        self.tx.send(CoordinatorEvent::from(msg))
    }
}

/// Creates the coordinator channel. Returns (Sender, Receiver).
pub fn create_coordinator_channel() -> (CoordinatorSender, Receiver<CoordinatorEvent>) {
    let (tx, rx) = mpsc::channel();
    (CoordinatorSender::new(tx), rx)
}
