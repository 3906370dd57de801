use super::common::StatDeltas;

/// Per-cache counters. They only ever grow during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub(crate) reads: u64,
    pub(crate) read_hits: u64,
    pub(crate) read_misses: u64,
    pub(crate) writes: u64,
    pub(crate) write_hits: u64,
    pub(crate) write_misses: u64,
    pub(crate) writebacks: u64,
    pub(crate) memory_transfers: u64,
    pub(crate) invalidations: u64,
    pub(crate) get_s_msgs: u64,
    pub(crate) get_m_msgs: u64,
    pub(crate) silent_upgrades: u64,
    pub(crate) serviced_from_mem: u64,
    pub(crate) serviced_from_peer: u64,
}

impl Statistics {
    pub fn reads(&self) -> u64 { self.reads }
    pub fn read_hits(&self) -> u64 { self.read_hits }
    pub fn read_misses(&self) -> u64 { self.read_misses }
    pub fn writes(&self) -> u64 { self.writes }
    pub fn write_hits(&self) -> u64 { self.write_hits }
    pub fn write_misses(&self) -> u64 { self.write_misses }
    pub fn writebacks(&self) -> u64 { self.writebacks }
    /// blocks sent to memory, one per write-back
    pub fn memory_transfers(&self) -> u64 { self.memory_transfers }
    pub fn invalidations(&self) -> u64 { self.invalidations }
    pub fn get_s_msgs(&self) -> u64 { self.get_s_msgs }
    /// ownership (getM) messages put on the bus
    pub fn get_m_msgs(&self) -> u64 { self.get_m_msgs }
    pub fn silent_upgrades(&self) -> u64 { self.silent_upgrades }
    pub fn serviced_from_mem(&self) -> u64 { self.serviced_from_mem }
    /// requests of other cores this cache supplied data for
    pub fn serviced_from_peer(&self) -> u64 { self.serviced_from_peer }

    pub fn accesses(&self) -> u64 {
        self.reads + self.writes
    }

    /// total miss rate in percent; 0 for an idle cache
    pub fn miss_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            n => (self.read_misses + self.write_misses) as f64 / n as f64 * 100.0,
        }
    }

    pub(crate) fn apply(&mut self, deltas: &StatDeltas) {
        self.serviced_from_peer += deltas.peer_serviced;
        self.serviced_from_mem += deltas.memory_serviced;
        self.invalidations += deltas.invalidations;
    }
}

impl std::ops::AddAssign<&Statistics> for Statistics {
    fn add_assign(&mut self, rhs: &Statistics) {
        self.reads += rhs.reads;
        self.read_hits += rhs.read_hits;
        self.read_misses += rhs.read_misses;
        self.writes += rhs.writes;
        self.write_hits += rhs.write_hits;
        self.write_misses += rhs.write_misses;
        self.writebacks += rhs.writebacks;
        self.memory_transfers += rhs.memory_transfers;
        self.invalidations += rhs.invalidations;
        self.get_s_msgs += rhs.get_s_msgs;
        self.get_m_msgs += rhs.get_m_msgs;
        self.silent_upgrades += rhs.silent_upgrades;
        self.serviced_from_mem += rhs.serviced_from_mem;
        self.serviced_from_peer += rhs.serviced_from_peer;
    }
}

impl<'a> std::iter::Sum<&'a Statistics> for Statistics {
    fn sum<I: Iterator<Item = &'a Statistics>>(iter: I) -> Self {
        let mut total = Statistics::default();
        for s in iter {
            total += s;
        }
        total
    }
}
