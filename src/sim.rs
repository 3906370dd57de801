//! Event-driven replay on top of asynchronix.
//!
//! Every cache is a model. A cache's snoop requestor is connected to all
//! *other* caches, so a request query performs the local access, awaits the
//! replies of every peer and only then resolves, which gives the same
//! ordering as [`BusCoordinator`](crate::coherence::BusCoordinator).

use asynchronix::model::{Model, Requestor};
use asynchronix::simulation::{Address, Mailbox, SimInit, Simulation};
use asynchronix::time::MonotonicTime;
use log::debug;
use thiserror::Error;

use crate::coherence::*;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("query to cache {0} was not answered")]
    Unanswered(usize),
}

pub struct CacheModel {
    cache: Cache,
    processors: usize,
    pub r_snoop: Requestor<(BusAction, Addr), SnoopResponse>,
}

impl CacheModel {
    pub fn new(cache: Cache, processors: usize) -> Self {
        CacheModel { cache, processors, r_snoop: Requestor::new() }
    }

    // inputs

    pub async fn on_proc_req(&mut self, (op, addr): (Op, Addr)) -> BusAction {
        let action = self.cache.access(addr, op);
        let summary: SnoopSummary = self.r_snoop.send((action, addr)).await.collect();
        debug!("P{} {op:?} {addr}: {action:?}, {summary:?}", self.cache.id);
        let resolved = self.cache.resolve(&summary, self.processors, addr, action);
        self.cache.apply(&(summary.requester_deltas() + resolved));
        action
    }
    pub async fn on_snoop(&mut self, (action, addr): (BusAction, Addr)) -> SnoopResponse {
        let resp = self.cache.snoop(action, addr);
        self.cache.apply(&resp.local_deltas());
        resp
    }
    pub async fn on_stats(&mut self, _: ()) -> Statistics {
        self.cache.stats().clone()
    }
    pub async fn on_state(&mut self, addr: Addr) -> CoherenceState {
        self.cache.state_of(addr)
    }
}

impl Model for CacheModel {}

/// Multiprocessor built from [`CacheModel`]s wired through a simulation.
pub struct EventSystem {
    sim: Simulation,
    addrs: Vec<Address<CacheModel>>,
}

impl EventSystem {
    pub fn new(specs: SystemSpec) -> Result<Self, SimError> {
        let geo = specs.validate()?;
        let n = specs.num_procs;

        // create models and mailboxes
        let mut models = (0..n)
            .map(|i| CacheModel::new(Cache::new(i, specs.protocol, geo), n))
            .collect::<Vec<_>>();
        let mut mboxes = (0..n).map(|_| Mailbox::<CacheModel>::new()).collect::<Vec<_>>();
        let addrs = mboxes.iter().map(|mb| mb.address()).collect::<Vec<_>>();

        // connect every cache to all of its peers
        for (i, model) in models.iter_mut().enumerate() {
            for (j, mbox) in mboxes.iter().enumerate() {
                if i != j {
                    model.r_snoop.connect(CacheModel::on_snoop, mbox);
                }
            }
        }

        let mut simi = SimInit::new();
        for (model, mbox) in models.drain(..).zip(mboxes.drain(..)) {
            simi = simi.add_model(model, mbox);
        }
        let sim = simi.init(MonotonicTime::EPOCH);
        Ok(EventSystem { sim, addrs })
    }

    pub fn request(&mut self, proc_id: usize, op: Op, addr: Addr) -> Result<BusAction, SimError> {
        self.sim
            .send_query(CacheModel::on_proc_req, (op, addr), &self.addrs[proc_id])
            .map_err(|_| SimError::Unanswered(proc_id))
    }

    pub fn stats(&mut self) -> Result<Vec<Statistics>, SimError> {
        (0..self.addrs.len())
            .map(|i| {
                self.sim
                    .send_query(CacheModel::on_stats, (), &self.addrs[i])
                    .map_err(|_| SimError::Unanswered(i))
            })
            .collect()
    }

    pub fn states_of(&mut self, addr: Addr) -> Result<Vec<CoherenceState>, SimError> {
        (0..self.addrs.len())
            .map(|i| {
                self.sim
                    .send_query(CacheModel::on_state, addr, &self.addrs[i])
                    .map_err(|_| SimError::Unanswered(i))
            })
            .collect()
    }
}
