//! Latest-State Store
//!
//! Single slot holding the most recent reading and its prediction as one
//! immutable snapshot. Writers swap a fresh `Arc` in under the write lock
//! and readers clone the `Arc` out, so a reader sees either the whole
//! previous pair or the whole new pair.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::{PredictionResult, SensorReading};

/// One completed ingestion cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub reading: SensorReading,
    pub result: PredictionResult,
    /// 1-based ingestion cycle number
    pub cycle: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LatestState {
    Empty,
    Present(Arc<Snapshot>),
}

#[derive(Debug, Default)]
pub struct LatestStateStore {
    slot: RwLock<Option<Arc<Snapshot>>>,
    has_received_data: AtomicBool,
    cycles: AtomicU64,
}

impl LatestStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored pair. Returns the cycle number assigned to it.
    pub fn set(&self, reading: SensorReading, result: PredictionResult) -> u64 {
        let mut slot = self.slot.write();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(Arc::new(Snapshot { reading, result, cycle }));
        self.has_received_data.store(true, Ordering::Release);
        cycle
    }

    pub fn get(&self) -> LatestState {
        match self.slot.read().as_ref() {
            Some(snapshot) => LatestState::Present(Arc::clone(snapshot)),
            None => LatestState::Empty,
        }
    }

    /// True once the store has left `Empty`. Never reverts.
    pub fn has_received_data(&self) -> bool {
        self.has_received_data.load(Ordering::Acquire)
    }

    /// Number of completed ingestion cycles
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}
