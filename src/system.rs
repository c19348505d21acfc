//! Node/zone registry: the minimal ambient scaffolding
//! `kcompactd_run`/`kcompactd_stop`/`wakeup_kcompactd` need to operate on
//! something concrete. Not a named module in the distilled spec — grounded
//! in how the teacher crate's top-level `lib.rs` wires submodule state
//! behind a single `initialize_memory_management()` entry point.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::daemon::{kcompactd_run, KcompactdHandle, NodeId};
use crate::driver::{MigrationEngine, ZoneOracle};
use crate::error::{CompactionError, Result};
use crate::zone::Zone;

/// Owns every node's zone list and (optionally) its running background
/// daemon handle.
#[derive(Default)]
pub struct CompactionSystem {
    nodes: BTreeMap<NodeId, Vec<Arc<Zone>>>,
    daemons: BTreeMap<NodeId, KcompactdHandle>,
}

impl CompactionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `zones` under `node`, in ascending class-zone-index order.
    pub fn register_node(&mut self, node: NodeId, zones: Vec<Arc<Zone>>) {
        self.nodes.insert(node, zones);
    }

    /// Zones registered for `node`, if any.
    pub fn zones(&self, node: NodeId) -> Result<&[Arc<Zone>]> {
        self.nodes
            .get(&node)
            .map(Vec::as_slice)
            .ok_or(CompactionError::UnknownNode(node))
    }

    fn zone_by_index(&self, node: NodeId, zone_idx: usize) -> Result<&Arc<Zone>> {
        self.zones(node)?.get(zone_idx).ok_or(CompactionError::UnknownZone(zone_idx))
    }

    /// Validate `order` against `node`'s zone at `zone_idx`.
    pub fn validate_order(&self, node: NodeId, zone_idx: usize, order: u32) -> Result<()> {
        let zone = self.zone_by_index(node, zone_idx)?;
        if order >= zone.config.max_order {
            return Err(CompactionError::InvalidOrder { requested: order, max_order: zone.config.max_order });
        }
        Ok(())
    }

    /// Register the background daemon for `node`. The daemon does no work
    /// on its own; the host scheduler drives it by calling
    /// [`kcompactd_poll`](Self::kcompactd_poll) whenever
    /// [`kcompactd_runnable`](Self::kcompactd_runnable) reports pending work.
    pub fn kcompactd_run(&mut self, node: NodeId) -> Result<()> {
        if self.daemons.contains_key(&node) {
            return Err(CompactionError::DaemonAlreadyRunning(node));
        }
        let zones = self.zones(node)?.to_vec();
        let handle = kcompactd_run(node, zones);
        self.daemons.insert(node, handle);
        Ok(())
    }

    /// Stop the background daemon for `node`. There is no OS thread to
    /// join: once stopped, further `kcompactd_poll` calls for this node
    /// are no-ops.
    pub fn kcompactd_stop(&mut self, node: NodeId) -> Result<()> {
        match self.daemons.remove(&node) {
            Some(handle) => {
                handle.stop();
                Ok(())
            }
            None => Err(CompactionError::DaemonNotRunning(node)),
        }
    }

    /// Notify `node`'s background daemon that an allocation needs `order`
    /// at `classzone_idx` or higher.
    pub fn wakeup_kcompactd(&self, node: NodeId, order: u32, classzone_idx: usize) -> Result<()> {
        match self.daemons.get(&node) {
            Some(handle) => {
                handle.wakeup(order, classzone_idx);
                Ok(())
            }
            None => Err(CompactionError::DaemonNotRunning(node)),
        }
    }

    /// True if `node`'s daemon has an outstanding wake request the host
    /// scheduler should service by calling
    /// [`kcompactd_poll`](Self::kcompactd_poll).
    pub fn kcompactd_runnable(&self, node: NodeId) -> bool {
        self.daemons.get(&node).is_some_and(|handle| handle.is_runnable())
    }

    /// Drive one work cycle of `node`'s background daemon if it is
    /// runnable. Called by the host scheduler in place of a dedicated OS
    /// thread loop.
    pub fn kcompactd_poll<E: MigrationEngine, O: ZoneOracle>(
        &self,
        node: NodeId,
        engine: &mut E,
        oracle: &O,
    ) -> Result<()> {
        match self.daemons.get(&node) {
            Some(handle) => {
                handle.poll(engine, oracle);
                Ok(())
            }
            None => Err(CompactionError::DaemonNotRunning(node)),
        }
    }
}
