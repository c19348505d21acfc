//! Pageblock skip-hint cache: avoid re-scanning blocks that recently
//! yielded nothing, with a bounded-staleness reset on full-zone completion.

use crate::control::CompactControl;
use crate::page::{pageblock_end_pfn, Page, Pfn};
use crate::zone::{CompactionMode, Zone, ZoneState};

/// Sample stride used when rebuilding the skip cache from scratch.
const RESET_SAMPLE_STRIDE: u64 = 16;

/// Claim exclusive scan rights over the pageblock containing `pfn`.
///
/// Returns the prior value of the skip bit. Honors `ignore_skip_hint`
/// (always returns `false`, never mutates) and `no_set_skip_hint` (checks,
/// but never sets). During a rescan pass (`cc.rescan`) the early-return on
/// an already-claimed block is bypassed — ownership no longer matters once
/// every block in the zone is being revisited — but the bit is still set.
pub fn test_and_set_skip(cc: &CompactControl, state: &mut ZoneState, pfn: Pfn) -> bool {
    if cc.ignore_skip_hint {
        return false;
    }
    if pfn % cc.zone.config.pageblock_pages() != 0 {
        return false;
    }

    let idx = cc.zone.pageblock_index_of(pfn);
    let was_set = state.skip_bits[idx];

    if !was_set && !cc.no_set_skip_hint {
        state.skip_bits[idx] = true;
    }

    if cc.rescan {
        return false;
    }

    was_set
}

/// Advance the cached migrate-scanner restart PFN past `pfn`'s pageblock,
/// if the scan has moved further than the cache already recorded. Honors
/// `no_set_skip_hint`. Sync modes additionally advance the async slot,
/// mirroring the source's `cc->mode != MIGRATE_ASYNC` branch.
pub fn update_cached_migrate(cc: &CompactControl, state: &mut ZoneState, pfn: Pfn) {
    if cc.no_set_skip_hint {
        return;
    }
    let next = pageblock_end_pfn(pfn, cc.zone.pageblock_order());

    if next > state.cached_migrate_pfn[0] {
        state.cached_migrate_pfn[0] = next;
    }
    if cc.mode != CompactionMode::Async && next > state.cached_migrate_pfn[1] {
        state.cached_migrate_pfn[1] = next;
    }
}

/// Mark a pageblock to be skipped in the future because isolation found
/// nothing there, and pull the cached free-scanner restart PFN backward to
/// cover it on the next pass.
pub fn update_pageblock_skip(cc: &CompactControl, state: &mut ZoneState, pfn: Pfn) {
    if cc.no_set_skip_hint {
        return;
    }
    let idx = cc.zone.pageblock_index_of(pfn);
    state.skip_bits[idx] = true;

    if pfn < state.cached_free_pfn {
        state.cached_free_pfn = pfn;
    }
}

/// Flush and rebuild the skip-hint cache, if `blockskip_flush` is set.
///
/// Walks pairs of pageblocks moving toward each other from both zone ends,
/// sampling one page every [`RESET_SAMPLE_STRIDE`] PFNs; any pageblock
/// whose sample contains an LRU page (migration source candidate) or a
/// buddy page (migration target candidate) has its skip bit cleared. The
/// cached restart PFNs are re-seeded to the lowest suitable source / the
/// highest suitable target found; if the cursors cross before finding
/// either, both caches collapse to the crossing point.
pub fn reset_isolation_suitable(zone: &Zone, state: &mut ZoneState) {
    if !state.blockskip_flush {
        return;
    }
    state.blockskip_flush = false;

    let pageblock_pages = zone.config.pageblock_pages();
    let mut migrate_pfn = zone.start_pfn;
    let mut free_pfn = zone.end_pfn.saturating_sub(1);
    let mut reset_migrate = free_pfn;
    let mut reset_free = migrate_pfn;
    let mut source_set = false;
    let mut free_set = false;

    while migrate_pfn < free_pfn {
        if reset_isolation_pfn(zone, state, migrate_pfn, true, source_set) && migrate_pfn < reset_migrate
        {
            source_set = true;
            reset_migrate = migrate_pfn;
            state.cached_migrate_pfn[0] = reset_migrate;
            state.cached_migrate_pfn[1] = reset_migrate;
        }

        if reset_isolation_pfn(zone, state, free_pfn, free_set, true) && free_pfn > reset_free {
            free_set = true;
            reset_free = free_pfn;
            state.cached_free_pfn = reset_free;
        }

        migrate_pfn += pageblock_pages;
        free_pfn = free_pfn.saturating_sub(pageblock_pages);
    }

    if reset_migrate >= reset_free {
        state.cached_migrate_pfn[0] = migrate_pfn;
        state.cached_migrate_pfn[1] = migrate_pfn;
        state.cached_free_pfn = free_pfn;
    }
}

/// Sample one pageblock at `pfn`: clear its skip bit if (depending on
/// `check_source`/`check_target`) it contains a suitable migration source
/// or target page, and report whether it was cleared.
fn reset_isolation_pfn(
    zone: &Zone,
    state: &mut ZoneState,
    pfn: Pfn,
    check_source: bool,
    check_target: bool,
) -> bool {
    let idx = zone.pageblock_index_of(pfn);
    let block_start = crate::zone::pageblock_start(pfn, zone.pageblock_order());
    let block_end = core::cmp::min(block_start + zone.config.pageblock_pages(), zone.end_pfn);

    let mut suitable = false;
    let mut sample = block_start;
    while sample < block_end {
        let page: Page = zone.page_at(state, sample);
        if (check_source && page.is_lru()) || (check_target && page.is_buddy()) {
            suitable = true;
            break;
        }
        sample += RESET_SAMPLE_STRIDE;
    }

    if suitable {
        state.skip_bits[idx] = false;
    }
    suitable
}
