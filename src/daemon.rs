//! Background compaction daemon: one logical worker per NUMA node, woken
//! by allocation pressure and running sync-light compaction in the
//! background so direct (synchronous) compaction is needed less often.
//!
//! The source's `kcompactd` is a dedicated kernel thread parked on a
//! waitqueue. This crate has no scheduler of its own (see `spec.md`'s
//! sysfs/hotplug non-goals), so the worker is modeled the way the kernel's
//! own schedulable threads are: a small state machine (wake request +
//! running flag) that a host scheduler drives by calling [`KcompactdHandle::poll`]
//! whenever it decides this logical thread is runnable, rather than a
//! spawned OS thread blocked on a condvar.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::driver::{compact_zone, CompactResult, MigrationEngine, ZoneOracle};
use crate::page::Migratetype;
use crate::{CompactControl, CompactionMode, Zone};

/// Small integer identifying a NUMA node. No topology discovery is in
/// scope; the caller assigns these.
pub type NodeId = u32;

/// Wake conditions recorded for the daemon; mirrors `kcompactd_max_order`
/// / `kcompactd_classzone_idx` on the source's `pglist_data`.
#[derive(Debug, Default, Clone, Copy)]
struct WakeRequest {
    max_order: u32,
    classzone_idx: usize,
    pending: bool,
}

/// A per-node background compaction worker, modeled as a cooperatively
/// scheduled logical thread rather than an OS thread.
///
/// [`is_runnable`](Self::is_runnable) reports whether a host scheduler
/// should schedule this thread; [`poll`](Self::poll) is the thread body,
/// run inline by whatever called it. There is no internal loop and
/// nothing blocks: a caller with nothing else to do simply doesn't call
/// `poll` until `is_runnable` says there's work.
pub struct KcompactdHandle {
    zones: Vec<Arc<Zone>>,
    wake: Mutex<WakeRequest>,
    running: AtomicBool,
}

impl KcompactdHandle {
    /// Notify the daemon that an allocation needs `order` at `classzone_idx`
    /// or higher. Only raises the recorded high-water mark; never lowers it.
    pub fn wakeup(&self, order: u32, classzone_idx: usize) {
        let mut wake = self.wake.lock();
        if order > wake.max_order || !wake.pending {
            wake.max_order = wake.max_order.max(order);
            wake.classzone_idx = classzone_idx;
            wake.pending = true;
        }
    }

    /// True if this worker has an outstanding wake request and has not
    /// been stopped — mirrors `ThreadState::Runnable` in the kernel's own
    /// thread model. The host scheduler checks this before calling
    /// [`poll`](Self::poll).
    pub fn is_runnable(&self) -> bool {
        self.running.load(Ordering::Relaxed) && self.wake.lock().pending
    }

    /// Run one work cycle if a wake request is outstanding; a no-op
    /// otherwise. This is the daemon's entire "thread body" — the host
    /// scheduler calls it in place of letting a spawned OS thread run.
    pub fn poll<E: MigrationEngine, O: ZoneOracle>(&self, engine: &mut E, oracle: &O) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }

        let request = {
            let mut wake = self.wake.lock();
            if !wake.pending {
                return;
            }
            let req = *wake;
            wake.pending = false;
            req
        };

        clog!(
            debug,
            "kcompactd: waking for order={} classzone={}",
            request.max_order,
            request.classzone_idx
        );

        let upper = request.classzone_idx.min(self.zones.len().saturating_sub(1));
        run_work_cycle(&self.zones[..=upper], request.max_order, engine, oracle);

        // Only clear the recorded high-water mark if a fresher wakeup did
        // not arrive mid-cycle (source: the `<=` guard in
        // `kcompactd_do_work`).
        let mut wake = self.wake.lock();
        if !wake.pending && wake.max_order <= request.max_order {
            wake.max_order = 0;
            wake.classzone_idx = self.zones.len().saturating_sub(1);
        }
    }

    /// Request the worker stop. Idempotent. Unlike a joined OS thread,
    /// there is nothing to wait for: once `running` is cleared, `poll`
    /// becomes a no-op and the host scheduler should simply stop calling it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Register the background worker for `node`. `zones` is the node's zone
/// list in ascending class-zone-index order (as `compact_zone` itself
/// expects no particular order, but the wakeup's `classzone_idx` bounds how
/// many of the low-indexed zones are serviced per the source's
/// `kcompactd_do_work`).
pub fn kcompactd_run(_node: NodeId, zones: Vec<Arc<Zone>>) -> KcompactdHandle {
    clog!(info, "kcompactd: worker registered");
    KcompactdHandle { zones, wake: Mutex::new(WakeRequest::default()), running: AtomicBool::new(true) }
}

fn run_work_cycle<E: MigrationEngine, O: ZoneOracle>(
    zones: &[Arc<Zone>],
    order: u32,
    engine: &mut E,
    oracle: &O,
) {
    let mut drain = |_zone: &Zone| {};
    for (class_zone_idx, zone) in zones.iter().enumerate() {
        {
            let state = zone.lock();
            if matches!(
                crate::driver::compaction_suitable(zone, &state, Some(order), 0, class_zone_idx, oracle),
                CompactResult::Skipped
            ) {
                continue;
            }
        }

        let mut cc = CompactControl::new(
            zone.clone(),
            Some(order),
            CompactionMode::SyncLight,
            Migratetype::Movable,
            class_zone_idx,
        );

        let result = compact_zone(&mut cc, engine, oracle, &mut drain);

        let mut state = zone.lock();
        match result {
            CompactResult::Success => state.defer.reset(order, true),
            CompactResult::Complete | CompactResult::PartialSkipped => state.defer.defer(order),
            _ => {}
        }
    }
}
