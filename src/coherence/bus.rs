use log::{debug, log_enabled, trace, Level};

use super::cache::Cache;
use super::common::*;

/// Serialising snooping bus: one request is carried to completion before the
/// next one starts.
pub struct BusCoordinator {
    specs: SystemSpec,
    caches: Vec<Cache>,
}

impl BusCoordinator {
    pub fn new(specs: SystemSpec) -> Result<Self, ConfigError> {
        let geo = specs.validate()?;
        let caches = (0..specs.num_procs)
            .map(|id| Cache::new(id, specs.protocol, geo))
            .collect();
        Ok(BusCoordinator { specs, caches })
    }

    pub fn specs(&self) -> &SystemSpec { &self.specs }
    pub fn caches(&self) -> &[Cache] { &self.caches }

    /// # Panics
    /// if `proc_id` is not below the configured number of processors
    pub fn cache(&self, proc_id: usize) -> &Cache {
        &self.caches[proc_id]
    }

    /// State of `addr`'s line in every cache, indexed by processor.
    pub fn states_of(&self, addr: Addr) -> Vec<CoherenceState> {
        self.caches.iter().map(|c| c.state_of(addr)).collect()
    }

    /// At most one cache holds `addr` as Modified, Exclusive or Owned.
    pub fn check_exclusive(&self, addr: Addr) -> bool {
        self.states_of(addr).into_iter().filter(|s| s.is_owning()).count() <= 1
    }

    fn dump_states(&self, when: &str, addr: Addr) {
        if log_enabled!(Level::Trace) {
            let states: String = self.states_of(addr).iter().map(|s| s.letter()).collect();
            trace!("{when} {addr}: [{states}]");
        }
    }

    /// Runs one processor request through the bus.
    ///
    /// `proc_id` must be below the configured number of processors; the trace
    /// reader checks this for records it produces.
    pub fn request(&mut self, proc_id: usize, op: Op, addr: Addr) -> BusAction {
        self.dump_states("before", addr);

        // local access completes before anyone snoops
        let action = self.caches[proc_id].access(addr, op);

        let mut summary = SnoopSummary::default();
        let mut peer_deltas = Vec::with_capacity(self.caches.len());
        for peer in self.caches.iter_mut().filter(|c| c.id != proc_id) {
            let resp = peer.snoop(action, addr);
            summary.absorb(&resp);
            peer_deltas.push((peer.id, resp.local_deltas()));
        }
        debug!("P{proc_id} {op:?} {addr}: {action:?}, {summary:?}");

        // every peer has answered, settle the requester
        let requester = &mut self.caches[proc_id];
        let resolved = requester.resolve(&summary, self.specs.num_procs, addr, action);
        requester.apply(&(summary.requester_deltas() + resolved));
        for (id, deltas) in peer_deltas {
            self.caches[id].apply(&deltas);
        }

        self.dump_states("after", addr);
        debug_assert!(self.check_exclusive(addr), "two owners of {addr}");
        action
    }
}
