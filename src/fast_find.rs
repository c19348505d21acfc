//! Fast finders: jump the scanners directly to promising pageblocks via the
//! free-area lists instead of a linear PFN walk.

use alloc::vec::Vec;

use crate::config::PAGE_ALLOC_COSTLY_ORDER;
use crate::control::CompactControl;
use crate::isolate_free::isolate_freepages_block;
use crate::page::{Migratetype, Pfn};
use crate::skip_hint::test_and_set_skip;
use crate::zone::ZoneState;

/// Once `fast_search_fail` exceeds this, the fast free finder stops being
/// tried for the remainder of the pass.
const MAX_FAST_SEARCH_FAIL: u32 = 5;

/// Probes tried per bucket before falling back from "top quarter" to
/// "top half" of the migrate/free gap.
const MAX_CANDIDATES_PER_BUCKET: usize = 8;

/// Round-robin the free-area buckets from `cc.search_order` downward,
/// looking for a page near the high end of the current migrate/free gap to
/// use as a compaction target without a linear free scan.
///
/// On success, isolates the page, splits it to order-0 units via
/// [`isolate_freepages_block`] over its containing pageblock, and returns
/// its PFN. On failure, bumps `cc.fast_search_fail` and returns `None`;
/// once the failure count exceeds [`MAX_FAST_SEARCH_FAIL`] this function
/// becomes a guaranteed `None` so the caller falls back to the linear
/// free scanner.
pub fn fast_isolate_freepages(cc: &mut CompactControl, state: &mut ZoneState) -> Option<Pfn> {
    if cc.fast_search_fail > MAX_FAST_SEARCH_FAIL {
        return None;
    }

    let gap = cc.free_pfn.saturating_sub(cc.migrate_pfn);
    if gap == 0 {
        return None;
    }
    let top_quarter = cc.free_pfn.saturating_sub(gap / 4);
    let top_half = cc.free_pfn.saturating_sub(gap / 2);

    let max_order = cc.zone.config.max_order;
    let start_order = cc.search_order.min(max_order.saturating_sub(1));

    for step in 0..max_order {
        let order = (start_order + max_order - step) % max_order;
        if order == 0 {
            continue;
        }

        let found = pick_candidate(state, order as usize, top_quarter)
            .or_else(|| pick_candidate(state, order as usize, top_half));

        if let Some(pfn) = found {
            cc.zone.remove_free_page(state, pfn, order as u8, Migratetype::Movable);
            cc.search_order = order.saturating_sub(1);
            cc.fast_start_pfn = pfn;

            let block_start = crate::zone::pageblock_start(pfn, cc.zone.pageblock_order());
            let block_end = core::cmp::min(block_start + cc.zone.config.pageblock_pages(), cc.zone.end_pfn);
            let mut freelist = Vec::new();
            let mut cursor = block_start;
            isolate_freepages_block(cc, state, &mut cursor, block_end, &mut freelist, 1, false);
            cc.freepages.extend(freelist);

            clog!(debug, "fast_isolate_freepages: hit at pfn={pfn} order={order}");
            return Some(pfn);
        }
    }

    cc.fast_search_fail += 1;
    None
}

/// Scan bucket `order`'s movable free list in reverse for the first page
/// whose PFN is `>= threshold`.
fn pick_candidate(state: &ZoneState, order: usize, threshold: Pfn) -> Option<Pfn> {
    let bucket = state.free_area.get(order)?;
    let list = &bucket.free_list[Migratetype::Movable.as_index()];
    let mut seen = 0;
    for &pfn in list.iter().rev() {
        if pfn >= threshold {
            return Some(pfn);
        }
        seen += 1;
        if seen >= MAX_CANDIDATES_PER_BUCKET {
            break;
        }
    }
    None
}

/// For orders above [`PAGE_ALLOC_COSTLY_ORDER`], probe the movable free
/// lists for a pageblock with some free pages already — a good migration
/// source, since each migration it takes reduces the work left to free the
/// rest of the block. On a hit, claims the pageblock's skip bit and moves
/// the found page to the tail of its free list so the next search picks a
/// different block; returns the pageblock-aligned PFN.
pub fn fast_find_migrateblock(cc: &mut CompactControl, state: &mut ZoneState) -> Option<Pfn> {
    let order = cc.order?;
    if order <= PAGE_ALLOC_COSTLY_ORDER {
        return None;
    }

    let lower_half = cc.migrate_pfn + (cc.free_pfn.saturating_sub(cc.migrate_pfn)) / 2;
    let max_order = cc.zone.config.max_order;

    for candidate_order in (order as usize)..(max_order as usize) {
        let bucket = state.free_area.get(candidate_order)?;
        let list = &bucket.free_list[Migratetype::Movable.as_index()];

        let hit = list
            .iter()
            .enumerate()
            .find(|(_, &pfn)| pfn >= cc.migrate_pfn && pfn < lower_half)
            .map(|(idx, &pfn)| (idx, pfn));

        if let Some((idx, pfn)) = hit {
            let block_pfn = crate::zone::pageblock_start(pfn, cc.zone.pageblock_order());
            test_and_set_skip(cc, state, block_pfn);

            let bucket = &mut state.free_area[candidate_order];
            let list = &mut bucket.free_list[Migratetype::Movable.as_index()];
            if let Some(removed) = list.remove(idx) {
                list.push_back(removed);
            }

            clog!(debug, "fast_find_migrateblock: claimed block_pfn={block_pfn}");
            return Some(block_pfn);
        }
    }

    None
}
