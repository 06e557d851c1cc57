use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::classification::domain::ranked_result::RankedResult;

/// Point-in-time view of one slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotSnapshot {
    pub in_flight: usize,
    pub last_result: Option<Arc<RankedResult>>,
}

#[derive(Default)]
struct Slot {
    in_flight: AtomicUsize,
    last_result: Mutex<Option<Arc<RankedResult>>>,
}

/// Fixed-capacity table holding the latest classification per face slot.
///
/// Slots are addressed by the face's position in the current frame's
/// detection list. Every operation touches a single slot; the result lock
/// is held only long enough to clone or swap an `Arc`.
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns whatever slot `index` currently holds, possibly stale.
    ///
    /// # Panics
    /// If `index >= capacity()`.
    pub fn get(&self, index: usize) -> SlotSnapshot {
        let slot = &self.slots[index];
        SlotSnapshot {
            in_flight: slot.in_flight.load(Ordering::Acquire),
            last_result: slot
                .last_result
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Latest completed result for slot `index`.
    pub fn last_result(&self, index: usize) -> Option<Arc<RankedResult>> {
        self.slots[index]
            .last_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn begin_dispatch(&self, index: usize) {
        self.slots[index].in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Stores `result` (when present) and then decrements the in-flight
    /// count. `None` leaves the previous result in place.
    ///
    /// Returns `false` if the slot had nothing in flight; the count stays
    /// at zero and the mismatch is logged.
    pub fn complete_dispatch(&self, index: usize, result: Option<RankedResult>) -> bool {
        let slot = &self.slots[index];
        if let Some(result) = result {
            *slot
                .last_result
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(result));
        }
        let matched = slot
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if !matched {
            log::error!("Slot {index} completed with nothing in flight");
        }
        matched
    }

    /// Increments slot `index` and returns a guard that completes it exactly
    /// once, with no result if dropped unfinished.
    pub fn begin(self: &Arc<Self>, index: usize) -> PendingDispatch {
        self.begin_dispatch(index);
        PendingDispatch {
            table: Arc::clone(self),
            index,
            done: false,
        }
    }

    pub fn total_in_flight(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.in_flight.load(Ordering::Acquire))
            .sum()
    }
}

/// An open dispatch against one slot.
pub struct PendingDispatch {
    table: Arc<SlotTable>,
    index: usize,
    done: bool,
}

impl PendingDispatch {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn complete(mut self, result: Option<RankedResult>) {
        self.finish(result);
    }

    fn finish(&mut self, result: Option<RankedResult>) {
        if !self.done {
            self.done = true;
            self.table.complete_dispatch(self.index, result);
        }
    }
}

impl Drop for PendingDispatch {
    fn drop(&mut self) {
        self.finish(None);
    }
}
