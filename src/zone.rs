//! The page/zone data model: free-area buckets, the page table, and the
//! shared mutable state a zone's compactors contend over.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::CompactionConfig;
use crate::defer::DeferState;
use crate::page::{
    pageblock_index, pageblock_start_pfn, Migratetype, Page, PageFlags, Pfn, NUM_MIGRATETYPES,
};

/// Per-order free list, one bucket per migratetype.
#[derive(Debug, Default)]
pub struct FreeArea {
    pub free_list: [VecDeque<Pfn>; NUM_MIGRATETYPES],
    pub nr_free: usize,
}

impl FreeArea {
    fn push(&mut self, migratetype: Migratetype, pfn: Pfn) {
        self.free_list[migratetype.as_index()].push_back(pfn);
        self.nr_free += 1;
    }

    fn remove(&mut self, migratetype: Migratetype, pfn: Pfn) -> bool {
        let list = &mut self.free_list[migratetype.as_index()];
        if let Some(pos) = list.iter().position(|&p| p == pfn) {
            list.remove(pos);
            self.nr_free -= 1;
            true
        } else {
            false
        }
    }

    pub fn is_empty_for(&self, migratetype: Migratetype) -> bool {
        self.free_list[migratetype.as_index()].is_empty()
    }

    /// Find a migratetype other than `migratetype` with a free page at this
    /// order, for fallback allocation. Mirrors `find_suitable_fallback`'s
    /// simplified movable-steals-from-anyone policy.
    pub fn find_suitable_fallback(&self, migratetype: Migratetype) -> Option<Migratetype> {
        Migratetype::FALLBACK_ORDER
            .into_iter()
            .find(|&mt| mt != migratetype && !self.is_empty_for(mt))
    }
}

/// Shared mutable zone state, guarded by a single coarse lock (free-area
/// lists, skip bitmap, cached restart PFNs, and deferral counters all share
/// the same lock granularity, matching how briefly and how often they are
/// each touched).
pub struct ZoneState {
    pub pages: Vec<Page>,
    pub pageblock_migratetype: Vec<Migratetype>,
    pub free_area: Vec<FreeArea>,
    pub skip_bits: Vec<bool>,
    /// `[async, sync]` restart PFNs for the migrate scanner.
    pub cached_migrate_pfn: [Pfn; 2],
    pub cached_free_pfn: Pfn,
    pub blockskip_flush: bool,
    pub defer: DeferState,
}

/// A contiguous physical-memory zone.
pub struct Zone {
    pub start_pfn: Pfn,
    pub end_pfn: Pfn,
    pub config: CompactionConfig,
    state: Mutex<ZoneState>,
}

/// Index used to pick a slot in `cached_migrate_pfn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionMode {
    Async,
    SyncLight,
    Sync,
}

impl CompactionMode {
    pub(crate) fn cached_slot(self) -> usize {
        match self {
            CompactionMode::Async => 0,
            CompactionMode::SyncLight | CompactionMode::Sync => 1,
        }
    }

    pub fn is_async(self) -> bool {
        matches!(self, CompactionMode::Async)
    }
}

impl Zone {
    /// Build a zone of `nr_pages` pages, all free and Movable, starting at
    /// PFN `start_pfn`. Intended for tests and benchmarks.
    pub fn new_all_free(start_pfn: Pfn, nr_pages: u64, config: CompactionConfig) -> Self {
        let mut zone = Self::new_empty(start_pfn, nr_pages, config);
        {
            let mut state = zone.state.get_mut();
            let pageblock_pages = config.pageblock_pages();
            let mut pfn = start_pfn;
            while pfn < start_pfn + nr_pages {
                let order = max_pow2_order_fitting(pfn, start_pfn + nr_pages, config.max_order);
                place_free_block(&mut state, start_pfn, pfn, order, Migratetype::Movable);
                pfn += 1u64 << order;
            }
            let _ = pageblock_pages;
        }
        zone
    }

    /// Build a zone with no free pages and no page table populated beyond
    /// defaults (every page LRU-resident and Movable). Intended as a base
    /// for scenario-specific layouts built by tests.
    pub fn new_empty(start_pfn: Pfn, nr_pages: u64, config: CompactionConfig) -> Self {
        let nr_blocks = (nr_pages as usize).div_ceil(config.pageblock_pages() as usize);
        let state = ZoneState {
            pages: vec![Page::new(); nr_pages as usize],
            pageblock_migratetype: vec![Migratetype::Movable; nr_blocks],
            free_area: (0..config.max_order).map(|_| FreeArea::default()).collect(),
            skip_bits: vec![false; nr_blocks],
            cached_migrate_pfn: [start_pfn, start_pfn],
            cached_free_pfn: start_pfn + nr_pages,
            blockskip_flush: false,
            defer: DeferState::default(),
        };
        Self { start_pfn, end_pfn: start_pfn + nr_pages, config, state: Mutex::new(state) }
    }

    pub fn lock(&self) -> spin::MutexGuard<'_, ZoneState> {
        self.state.lock()
    }

    pub fn pageblock_order(&self) -> u32 {
        self.config.pageblock_order
    }

    pub fn pageblock_index_of(&self, pfn: Pfn) -> usize {
        pageblock_index(pfn, self.start_pfn, self.pageblock_order())
    }

    pub fn nr_pages(&self) -> u64 {
        self.end_pfn - self.start_pfn
    }

    fn page_index(&self, pfn: Pfn) -> usize {
        (pfn - self.start_pfn) as usize
    }

    pub fn page_at(&self, state: &ZoneState, pfn: Pfn) -> Page {
        state.pages[self.page_index(pfn)]
    }

    pub fn set_page(&self, state: &mut ZoneState, pfn: Pfn, page: Page) {
        let idx = self.page_index(pfn);
        state.pages[idx] = page;
    }

    /// Remove a free page of `order` from the free-area list tracking the
    /// given migratetype, marking it no longer buddy. Returns `true` if the
    /// page was actually present and removed.
    pub fn remove_free_page(
        &self,
        state: &mut ZoneState,
        pfn: Pfn,
        order: u8,
        migratetype: Migratetype,
    ) -> bool {
        if !state.free_area[order as usize].remove(migratetype, pfn) {
            return false;
        }
        let idx = self.page_index(pfn);
        state.pages[idx].flags.remove(PageFlags::BUDDY);
        true
    }

    /// Count total free pages across every order/migratetype bucket.
    pub fn count_free_pages(&self, state: &ZoneState) -> u64 {
        state
            .free_area
            .iter()
            .enumerate()
            .map(|(order, area)| area.nr_free as u64 * (1u64 << order))
            .sum()
    }
}

fn max_pow2_order_fitting(pfn: Pfn, end: Pfn, max_order: u32) -> u8 {
    let remaining = end - pfn;
    let mut order = 0u32;
    while order + 1 < max_order
        && (1u64 << (order + 1)) <= remaining
        && pfn % (1u64 << (order + 1)) == 0
    {
        order += 1;
    }
    order as u8
}

fn place_free_block(
    state: &mut ZoneState,
    zone_start: Pfn,
    pfn: Pfn,
    order: u8,
    migratetype: Migratetype,
) {
    let idx = (pfn - zone_start) as usize;
    state.pages[idx].flags.insert(PageFlags::BUDDY);
    state.pages[idx].order = order;
    state.free_area[order as usize].push(migratetype, pfn);
}

/// Mark a single page as a buddy free page of `order` directly in the page
/// table and the matching free-area bucket. Test/scenario-construction
/// helper; production code reaches free pages only via the isolators.
pub fn seed_free_page(
    zone: &Zone,
    state: &mut ZoneState,
    pfn: Pfn,
    order: u8,
    migratetype: Migratetype,
) {
    place_free_block(state, zone.start_pfn, pfn, order, migratetype);
}

/// Mark a single page as LRU-resident at order 0. Test/scenario helper.
///
/// Does not set [`PageFlags::MOVABLE`]: that flag marks the distinct
/// non-LRU movable-owner class (balloon-driver-style pages), not ordinary
/// LRU pages — setting both would make [`Page::is_movable_non_lru`] true
/// the moment isolation clears `LRU`, and putback would then wrongly treat
/// the page as never having been on LRU.
pub fn seed_lru_page(zone: &Zone, state: &mut ZoneState, pfn: Pfn) {
    let idx = (pfn - zone.start_pfn) as usize;
    state.pages[idx].flags = PageFlags::LRU;
    state.pages[idx].ref_count = 1;
    let _ = zone;
}

pub const fn pageblock_start(pfn: Pfn, pageblock_order: u32) -> Pfn {
    pageblock_start_pfn(pfn, pageblock_order)
}
