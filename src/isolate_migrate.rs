//! Migrate-page isolator: walks a pageblock picking movable pages off their
//! LRU list (or a non-LRU movable owner) onto a local migrate list.

use crate::config::SWAP_CLUSTER_MAX;
use crate::control::CompactControl;
use crate::page::{Page, PageFlags, Pfn};
use crate::skip_hint::update_pageblock_skip;
use crate::zone::ZoneState;

/// Outcome of walking one pageblock for migratable pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateMigrateResult {
    /// Scan reached `end_pfn` (or the zone's system-wide isolation limit
    /// forced an abort); the PFN it stopped at is carried separately.
    Scanned(Pfn),
    /// Aborted due to contention or cancellation; nothing further to do
    /// this pass.
    Aborted,
}

/// Ceiling on pages isolated system-wide before the isolator backs off.
/// Mirrors `COMPACT_ISOLATE_LIMIT`-style throttling in the source; kept
/// small here since this crate has no global accounting beyond the zone.
const SYSTEM_ISOLATION_LIMIT: usize = 1 << 20;

/// Walk `[low_pfn, end_pfn)`, isolating movable pages onto `cc.migratepages`.
///
/// Returns the first unscanned PFN on completion (`>= end_pfn`), or the PFN
/// reached so far wrapped in [`IsolateMigrateResult::Aborted`] if a
/// cancellation, fatal contention, or (async mode) a resched request fires
/// at a lock-release checkpoint.
pub fn isolate_migratepages_block(
    cc: &mut CompactControl,
    state: &mut ZoneState,
    low_pfn: Pfn,
    end_pfn: Pfn,
) -> IsolateMigrateResult {
    if cc.nr_migratepages >= SYSTEM_ISOLATION_LIMIT {
        if cc.mode.is_async() {
            return IsolateMigrateResult::Scanned(low_pfn);
        }
    }

    let mut pfn = low_pfn;
    let mut nr_isolated_this_block = 0usize;
    let block_start = pfn;

    while pfn < end_pfn {
        if (pfn - block_start) % SWAP_CLUSTER_MAX == 0 && pfn != block_start {
            if cc.should_abort() {
                clog!(trace, "isolate_migratepages_block: aborting at pfn={pfn}");
                return IsolateMigrateResult::Aborted;
            }
        }

        let page: Page = cc.zone.page_at(state, pfn);
        cc.total_migrate_scanned += 1;

        if page.is_buddy() {
            let order = page.order.max(1);
            pfn += 1u64 << order;
            continue;
        }

        if page.is_compound() {
            let order = page.compound_order.max(1);
            pfn += 1u64 << order;
            // Counts as a failed candidate for rescan accounting, not a
            // hard error: THP/hugetlbfs-like pages simply cannot migrate
            // through this path.
            continue;
        }

        if !page.is_lru() && !page.is_movable_non_lru() {
            pfn += 1;
            continue;
        }

        if page.is_isolated() {
            pfn += 1;
            continue;
        }

        if page.is_movable_non_lru() {
            let mut updated = page;
            updated.flags.insert(PageFlags::ISOLATED);
            cc.zone.set_page(state, pfn, updated);
            cc.migratepages.push(pfn);
            cc.nr_migratepages += 1;
            nr_isolated_this_block += 1;
            pfn += 1;
            continue;
        }

        if page.flags.contains(PageFlags::UNEVICTABLE) && !cc.zone.config.compact_unevictable_allowed {
            pfn += 1;
            continue;
        }

        let mut updated = page;
        updated.flags.remove(PageFlags::LRU);
        updated.flags.insert(PageFlags::ISOLATED);
        updated.ref_count += 1;
        cc.zone.set_page(state, pfn, updated);
        cc.migratepages.push(pfn);
        cc.nr_migratepages += 1;
        nr_isolated_this_block += 1;
        pfn += 1;
    }

    if nr_isolated_this_block == 0 || cc.rescan {
        update_pageblock_skip(cc, state, block_start);
    }

    IsolateMigrateResult::Scanned(pfn)
}

/// Release the sub-block of `cc.migratepages` isolated since `since_len`
/// back onto their LRU list, undoing [`isolate_migratepages_block`]'s work.
/// Used when an order-aligned sub-block's isolation fails in async direct
/// compaction and a partial migration cannot form the desired free run.
pub fn putback_movable_pages(cc: &mut CompactControl, state: &mut ZoneState, since_len: usize) {
    for pfn in cc.migratepages.split_off(since_len) {
        let mut page = cc.zone.page_at(state, pfn);
        page.flags.remove(PageFlags::ISOLATED);
        if !page.is_movable_non_lru() {
            page.flags.insert(PageFlags::LRU);
            page.ref_count = page.ref_count.saturating_sub(1);
        }
        cc.zone.set_page(state, pfn, page);
        cc.nr_migratepages -= 1;
    }
}

/// Bulk range isolator: drives [`isolate_migratepages_block`] across
/// successive pageblocks from `start_pfn` to `end_pfn`. Returns the
/// one-past-the-last scanned PFN, or `None` if aborted before reaching it.
pub fn isolate_migratepages_range(
    cc: &mut CompactControl,
    state: &mut ZoneState,
    start_pfn: Pfn,
    end_pfn: Pfn,
) -> Option<Pfn> {
    let pageblock_pages = cc.zone.config.pageblock_pages();
    let mut pfn = start_pfn;

    while pfn < end_pfn {
        let block_end = core::cmp::min(
            crate::zone::pageblock_start(pfn, cc.zone.pageblock_order()) + pageblock_pages,
            end_pfn,
        );
        match isolate_migratepages_block(cc, state, pfn, block_end) {
            IsolateMigrateResult::Scanned(next) => pfn = next,
            IsolateMigrateResult::Aborted => return None,
        }
    }
    Some(pfn)
}
