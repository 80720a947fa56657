use crate::error::ErrorSink;
use crate::task::Thunk;
use serde::Serialize;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub batches_armed: u64,
    pub drains: u64,
    pub thunks_run: u64,
    pub thunks_failed: u64,
}

/// Pending deferred work plus the `armed` flag.
///
/// `armed` is set by the append that opens a batch and cleared at the start
/// of the drain that consumes it, so a batch of any size costs one wake-up.
#[derive(Default)]
pub struct FlushQueue {
    pending: RefCell<SmallVec<[Thunk; 4]>>,
    armed: Cell<bool>,
    stats: Cell<QueueStats>,
}

impl FlushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail. Returns true when this append opened a new batch
    /// and the caller has to fire a trigger.
    pub fn append(&self, thunk: Thunk) -> bool {
        self.pending.borrow_mut().push(thunk);
        if self.armed.replace(true) {
            return false;
        }
        self.bump(|s| s.batches_armed += 1);
        true
    }

    /// Runs every thunk pending at entry, in insertion order. Thunks appended
    /// while this runs are left for the next drain.
    pub fn drain(&self, sink: &dyn ErrorSink, tag: &'static str) -> usize {
        // Swap the batch out before running anything so reentrant appends
        // land in the live queue and arm a fresh drain.
        self.armed.set(false);
        let batch = std::mem::take(&mut *self.pending.borrow_mut());

        let len = batch.len();
        let mut failed = 0;
        for thunk in batch {
            if !thunk.run(sink, tag) {
                failed += 1;
            }
        }

        self.bump(|s| {
            s.drains += 1;
            s.thunks_run += len as u64;
            s.thunks_failed += failed;
        });
        len
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut QueueStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}
