//! Free-page isolator: pulls buddy pages off the free-area lists and onto
//! a local freelist, splitting higher-order blocks to order-0 units.

use alloc::vec::Vec;

use crate::config::COMPACT_CLUSTER_MAX;
use crate::control::CompactControl;
use crate::page::{Page, Pfn};
use crate::zone::ZoneState;

/// Walk one pageblock-sized (or smaller) range in `stride` steps,
/// isolating buddy pages into `freelist`.
///
/// `strict=true` aborts and returns 0 on any hole (invalid PFN or
/// non-buddy page) — used by range isolation. `strict=false` (normal
/// compaction) accumulates what it can and stops early once
/// `nr_migratepages <= nr_freepages`. Returns the count isolated and
/// advances `*cursor` to the first unscanned PFN (clamped to `end_pfn`).
pub fn isolate_freepages_block(
    cc: &mut CompactControl,
    state: &mut ZoneState,
    cursor: &mut Pfn,
    end_pfn: Pfn,
    freelist: &mut Vec<Pfn>,
    stride: u64,
    strict: bool,
) -> usize {
    let stride = if strict { 1 } else { stride.max(1) };
    let mut total_isolated = 0usize;
    let mut nr_scanned = 0u64;
    let mut pfn = *cursor;

    while pfn < end_pfn {
        nr_scanned += 1;

        let page: Page = cc.zone.page_at(state, pfn);

        if page.is_compound() {
            let order = page.compound_order.max(1);
            pfn += (1u64 << order) - 1;
            if strict {
                break;
            }
            pfn += 1;
            continue;
        }

        if !page.is_buddy() {
            if strict {
                break;
            }
            pfn += stride;
            continue;
        }

        let order = page.order;
        let migratetype = state.pageblock_migratetype[cc.zone.pageblock_index_of(pfn)];
        if !cc.zone.remove_free_page(state, pfn, order, migratetype) {
            // Lost a race under the lock; treat like a hole.
            if strict {
                break;
            }
            pfn += stride;
            continue;
        }

        let isolated = 1u64 << order;
        for split_pfn in split_to_order0(pfn, order) {
            freelist.push(split_pfn);
            total_isolated += 1;
        }
        cc.nr_freepages += isolated as usize;

        pfn += isolated;

        if !strict && cc.nr_migratepages <= cc.nr_freepages {
            break;
        }
    }

    if pfn > end_pfn {
        pfn = end_pfn;
    }

    cc.total_free_scanned += nr_scanned;
    *cursor = pfn;

    if strict && pfn < end_pfn {
        total_isolated = 0;
    }
    total_isolated
}

fn split_to_order0(base_pfn: Pfn, order: u8) -> impl Iterator<Item = Pfn> {
    (0..(1u64 << order)).map(move |i| base_pfn + i)
}

/// Bulk range isolator (also usable for CMA-style allocation-range
/// validation): drives [`isolate_freepages_block`] in strict mode across
/// successive pageblocks. Returns the one-past-the-last isolated PFN, or
/// `None` (after releasing everything isolated so far) on the first short
/// isolation.
pub fn isolate_freepages_range(
    cc: &mut CompactControl,
    state: &mut ZoneState,
    start_pfn: Pfn,
    end_pfn: Pfn,
) -> Option<Pfn> {
    let pageblock_pages = cc.zone.config.pageblock_pages();
    let mut freelist = Vec::new();
    let mut pfn = start_pfn;

    while pfn < end_pfn {
        let block_end = core::cmp::min(
            crate::zone::pageblock_start(pfn, cc.zone.pageblock_order()) + pageblock_pages,
            end_pfn,
        );
        let mut cursor = pfn;
        let isolated =
            isolate_freepages_block(cc, state, &mut cursor, block_end, &mut freelist, 1, true);
        if isolated == 0 {
            break;
        }
        pfn += isolated as u64;
    }

    if pfn < end_pfn {
        release_freepages(cc, state, &mut freelist);
        return None;
    }
    Some(pfn)
}

/// Return every page on `freelist` to its zone's free-area list at order 0,
/// clearing local accounting. Used on any abort path so the Containment
/// invariant holds.
pub fn release_freepages(cc: &mut CompactControl, state: &mut ZoneState, freelist: &mut Vec<Pfn>) {
    for pfn in freelist.drain(..) {
        let idx = cc.zone.pageblock_index_of(pfn);
        let migratetype = state.pageblock_migratetype[idx];
        crate::zone::seed_free_page(&cc.zone, state, pfn, 0, migratetype);
        cc.nr_freepages = cc.nr_freepages.saturating_sub(1);
    }
}
