//! Deferral tracker: exponential back-off that suppresses repeated
//! compaction attempts against a zone after they keep failing.
//!
//! State lives per zone, not per order: `order_failed` is the threshold
//! below which a request is cheap enough to always retry.

use crate::config::COMPACT_MAX_DEFER_SHIFT;

/// Deferral counters for one zone.
#[derive(Debug, Clone, Copy)]
pub struct DeferState {
    considered: u32,
    defer_shift: u32,
    order_failed: u32,
}

impl Default for DeferState {
    fn default() -> Self {
        // order_failed starts "infinite" so nothing is deferred until a
        // failure actually lowers it.
        Self { considered: 0, defer_shift: 0, order_failed: u32::MAX }
    }
}

impl DeferState {
    /// Current back-off shift; `2^defer_shift` bounds how many consecutive
    /// deferrals `is_deferred` permits before letting one through.
    pub fn defer_shift(&self) -> u32 {
        self.defer_shift
    }

    /// Record a failed compaction attempt at `order`.
    pub fn defer(&mut self, order: u32) {
        self.considered = 0;
        self.defer_shift += 1;
        if order < self.order_failed {
            self.order_failed = order;
        }
        if self.defer_shift > COMPACT_MAX_DEFER_SHIFT {
            self.defer_shift = COMPACT_MAX_DEFER_SHIFT;
        }
    }

    /// Query-and-mutate: returns `true` if a request at `order` should be
    /// skipped this time. Mutates `considered` as a side effect of being
    /// called, matching the source's `compaction_deferred`.
    pub fn is_deferred(&mut self, order: u32) -> bool {
        let defer_limit = 1u32 << self.defer_shift;

        if order < self.order_failed {
            return false;
        }

        self.considered += 1;
        if self.considered > defer_limit {
            self.considered = defer_limit;
        }

        if self.considered >= defer_limit {
            return false;
        }

        true
    }

    /// Reset tracking after a compaction that succeeded, or is expected to.
    pub fn reset(&mut self, order: u32, alloc_success: bool) {
        if alloc_success {
            self.considered = 0;
            self.defer_shift = 0;
        }
        if order >= self.order_failed {
            self.order_failed = order + 1;
        }
    }

    /// True when back-off has saturated and a retry at `order` is
    /// happening anyway: the caller should flush stale skip-hint state
    /// before scanning, since it is more likely hiding real opportunities.
    pub fn is_restarting(&self, order: u32) -> bool {
        if order < self.order_failed {
            return false;
        }
        self.defer_shift == COMPACT_MAX_DEFER_SHIFT
            && self.considered >= (1u32 << self.defer_shift)
    }
}
