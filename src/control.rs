//! Per-invocation compaction state (`CompactControl` in the source).

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::page::Pfn;
use crate::zone::{CompactionMode, Zone};

/// Per-invocation working state for one `compact_zone` pass.
pub struct CompactControl {
    pub zone: Arc<Zone>,
    /// Requested order; `None` mirrors the source's `order == -1`
    /// "compact whole zone" mode.
    pub order: Option<u32>,
    pub search_order: u32,
    pub migratetype: crate::page::Migratetype,
    pub mode: CompactionMode,
    pub class_zone_idx: usize,
    pub direct_compaction: bool,
    pub whole_zone: bool,
    pub ignore_skip_hint: bool,
    pub ignore_block_suitable: bool,
    pub no_set_skip_hint: bool,

    pub migrate_pfn: Pfn,
    pub free_pfn: Pfn,
    pub fast_start_pfn: Pfn,

    pub nr_migratepages: usize,
    pub nr_freepages: usize,
    pub total_migrate_scanned: u64,
    pub total_free_scanned: u64,

    pub migratepages: Vec<Pfn>,
    pub freepages: Vec<Pfn>,

    pub contended: bool,
    pub rescan: bool,
    pub fast_search_fail: u32,

    /// Cooperative cancellation flag: set from outside (a fatal signal or a
    /// daemon stop request) and polled at lock-release checkpoints.
    pub cancel: Arc<AtomicBool>,
}

impl CompactControl {
    pub fn new(
        zone: Arc<Zone>,
        order: Option<u32>,
        mode: CompactionMode,
        migratetype: crate::page::Migratetype,
        class_zone_idx: usize,
    ) -> Self {
        let start = zone.start_pfn;
        let end = zone.end_pfn;
        Self {
            zone,
            order,
            search_order: order.unwrap_or(0),
            migratetype,
            mode,
            class_zone_idx,
            direct_compaction: false,
            whole_zone: false,
            ignore_skip_hint: false,
            ignore_block_suitable: false,
            no_set_skip_hint: false,
            migrate_pfn: start,
            free_pfn: end,
            fast_start_pfn: 0,
            nr_migratepages: 0,
            nr_freepages: 0,
            total_migrate_scanned: 0,
            total_free_scanned: 0,
            migratepages: Vec::new(),
            freepages: Vec::new(),
            contended: false,
            rescan: false,
            fast_search_fail: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// True if a cancellation request or (in async mode) a yield request
    /// should abort the current scan.
    pub fn should_abort(&self) -> bool {
        self.contended || self.cancel.load(Ordering::Relaxed)
    }

    /// Containment invariant (§8.1): both local lists and their counters
    /// must be empty/zero.
    pub fn is_contained(&self) -> bool {
        self.nr_migratepages == 0
            && self.nr_freepages == 0
            && self.migratepages.is_empty()
            && self.freepages.is_empty()
    }
}
