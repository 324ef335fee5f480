//! Aggregate progress for batch installs
//!
//! Each in-flight item owns an [`ItemCounter`] that its download callback
//! writes into. The scheduler's aggregator reads all counters on a fixed
//! interval and pushes one [`ProgressUpdate`] to the host's sink.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::logger;
use crate::models::ContentId;

/// Signal pushed to the host's progress indicator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProgressUpdate {
    /// Overall fraction in `[0, 1]`; `indeterminate` when nothing in flight
    /// knows its size yet
    Fraction { value: f64, indeterminate: bool },
    /// Remove the indicator
    Clear,
}

/// Receives aggregate progress; implemented by the host
pub trait ProgressSink: Send + Sync {
    fn publish(&self, update: ProgressUpdate);
}

/// Sink that writes progress to the application log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn publish(&self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Fraction {
                indeterminate: true,
                ..
            } => logger::log_debug("Batch progress: waiting for sizes", Some("progress")),
            ProgressUpdate::Fraction { value, .. } => logger::log_debug(
                &format!("Batch progress: {:.1}%", value * 100.0),
                Some("progress"),
            ),
            ProgressUpdate::Clear => logger::log_debug("Batch progress cleared", Some("progress")),
        }
    }
}

/// Byte counters for one in-flight item; `total == 0` means unknown
#[derive(Debug, Default)]
pub struct ItemCounter {
    received: AtomicU64,
    total: AtomicU64,
}

impl ItemCounter {
    pub fn record(&self, received: u64, total: u64) {
        self.received.store(received, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn load(&self) -> (u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

/// Progress state of one batch
#[derive(Debug)]
pub struct BatchProgress {
    slots: DashMap<ContentId, Arc<ItemCounter>>,
    completed: AtomicUsize,
    total: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            slots: DashMap::new(),
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Open the counter slot for an item that is about to start
    pub fn start_item(&self, id: &ContentId) -> Arc<ItemCounter> {
        let counter = Arc::new(ItemCounter::default());
        self.slots.insert(id.clone(), Arc::clone(&counter));
        counter
    }

    /// Count the item as completed (successfully or not) and drop its slot
    pub fn finish_item(&self, id: &ContentId) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.slots.remove(id);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    /// `completed / total + Σ(received / size) / total`, clamped to `[0, 1]`
    pub fn snapshot(&self) -> ProgressUpdate {
        if self.total == 0 {
            return ProgressUpdate::Fraction {
                value: 1.0,
                indeterminate: false,
            };
        }

        let total = self.total as f64;
        let mut value = self.completed() as f64 / total;
        let mut in_flight = 0usize;
        let mut sized = 0usize;

        for slot in self.slots.iter() {
            in_flight += 1;
            let (received, size) = slot.value().load();
            if size > 0 {
                sized += 1;
                value += (received as f64 / size as f64).min(1.0) / total;
            }
        }

        ProgressUpdate::Fraction {
            value: value.clamp(0.0, 1.0),
            indeterminate: in_flight > 0 && sized == 0,
        }
    }

    pub fn reset(&self) {
        self.slots.clear();
        self.completed.store(0, Ordering::SeqCst);
    }
}
