use log::{error, trace};

use super::common::*;
use super::line::CacheLine;
use super::stats::Statistics;

// data cache

#[derive(Debug, Clone)]
struct CacheSet {
    blocks: Vec<CacheLine>,
}

impl CacheSet {
    fn new(assoc: usize) -> Self {
        Self { blocks: vec![CacheLine::default(); assoc] }
    }
    fn find(&self, tag: u64) -> Option<usize> {
        self.blocks.iter().position(|b| b.matches(tag))
    }
    /// an invalid way if there is one, otherwise the least recently used way
    fn lru_way(&self) -> usize {
        if let Some(free) = self.blocks.iter().position(|b| !b.is_valid()) {
            return free;
        }
        // min_by_key keeps the first minimum, walking backwards lets the highest way win ties
        self.blocks
            .iter().enumerate().rev()
            .min_by_key(|(_, b)| b.last_used())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// What a snooping cache does with its copy of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction {
    pub next: CoherenceState,
    /// this cache sends the block to the requester
    pub supply: bool,
    /// the requester's data comes from memory
    pub memory: bool,
    /// the block is also written to memory
    pub write_back: bool,
}

impl Reaction {
    fn stay(state: CoherenceState) -> Self {
        Reaction { next: state, supply: false, memory: false, write_back: false }
    }
}

/// Snoop transition table: reaction of a valid line in `state` to a peer's `action`.
pub fn react(protocol: Protocol, action: BusAction, state: CoherenceState) -> Reaction {
    use CoherenceState::*;
    let mut r = Reaction::stay(state);
    match action {
        BusAction::NoAction => (),
        BusAction::Modified => {
            r.next = Invalid;
            match state {
                Modified | Exclusive | Owned => r.supply = true,
                Shared => r.memory = protocol == Protocol::Mesi,
                Invalid => (),
            }
        },
        BusAction::Shared => match state {
            Modified => {
                r.next = Shared;
                r.supply = true;
                r.write_back = true;
            },
            Shared => r.memory = true,
            _ => (),
        },
        BusAction::PollExclusive(_) => match (protocol, state) {
            (Protocol::Mesi, Modified) => {
                r.next = Shared;
                r.supply = true;
                r.write_back = true;
            },
            (Protocol::Mesi | Protocol::Moesi, Exclusive) => {
                r.next = Shared;
                r.supply = true;
            },
            (Protocol::Mosi | Protocol::Moesi, Modified | Owned) => {
                r.next = Owned;
                r.supply = true;
            },
            _ => (),
        },
    }
    r
}

pub struct Cache {
    pub id: usize,
    protocol: Protocol,
    geo: Geometry,
    sets: Vec<CacheSet>,
    cycle: u64,
    stats: Statistics,
}

impl Cache {
    pub fn new(id: usize, protocol: Protocol, geo: Geometry) -> Self {
        Self {
            id,
            protocol,
            geo,
            sets: vec![CacheSet::new(geo.assoc); geo.sets],
            cycle: 0,
            stats: Statistics::default(),
        }
    }

    pub fn protocol(&self) -> Protocol { self.protocol }
    pub fn geometry(&self) -> &Geometry { &self.geo }
    pub fn stats(&self) -> &Statistics { &self.stats }

    // helper functions

    fn find_line(&self, addr: &Addr) -> Option<(usize, usize)> {
        let (index, tag) = addr.pos(&self.geo);
        self.sets[index].find(tag).map(|way| (index, way))
    }
    fn line(&self, index: usize, way: usize) -> &CacheLine {
        &self.sets[index].blocks[way]
    }
    fn transition(&mut self, index: usize, way: usize, state: CoherenceState) {
        debug_assert!(
            self.protocol.allows(state),
            "{:?} is not a {} state", state, self.protocol
        );
        let line = &mut self.sets[index].blocks[way];
        if state == CoherenceState::Invalid {
            line.invalidate();
        } else {
            line.set_state(state);
        }
    }
    /// the bus action was issued by a cache running the same protocol
    fn accepts(&self, action: BusAction) -> bool {
        match action {
            BusAction::Shared => self.protocol == Protocol::Msi,
            BusAction::PollExclusive(p) => p == self.protocol,
            BusAction::Modified | BusAction::NoAction => true,
        }
    }

    /// Coherence state this cache holds for `addr`; absent lines are Invalid.
    pub fn state_of(&self, addr: Addr) -> CoherenceState {
        self.find_line(&addr)
            .map(|(index, way)| self.line(index, way).state())
            .unwrap_or_default()
    }

    /// Picks the way of `addr`'s set to be replaced and marks it as just used.
    pub fn find_victim(&mut self, addr: Addr) -> usize {
        let (index, _) = addr.pos(&self.geo);
        let way = self.sets[index].lru_way();
        self.sets[index].blocks[way].set_last_used(self.cycle);
        way
    }

    /// Installs `addr` in a victim way (Shared for now) and returns the way.
    fn fill_line(&mut self, addr: Addr) -> usize {
        let (index, tag) = addr.pos(&self.geo);
        let way = self.find_victim(addr);
        let victim = *self.line(index, way);
        // only Modified victims count as write-backs, Owned ones are dropped uncounted
        if victim.state() == CoherenceState::Modified {
            self.write_back(self.geo.line_addr(victim.tag(), index));
        }
        let line = &mut self.sets[index].blocks[way];
        line.set_tag(tag);
        line.set_state(CoherenceState::Shared);
        way
    }

    pub fn write_back(&mut self, addr: Addr) {
        trace!("cache {}: write back {}", self.id, addr);
        self.stats.writebacks += 1;
        self.stats.memory_transfers += 1;
    }

    // inputs

    /// Local processor access. Returns the action to broadcast on the bus.
    pub fn access(&mut self, addr: Addr, op: Op) -> BusAction {
        self.cycle += 1;
        match op {
            Op::Read => self.stats.reads += 1,
            Op::Write => self.stats.writes += 1,
        }
        match self.find_line(&addr) {
            Some((index, way)) => self.access_hit(index, way, op),
            None => self.access_miss(addr, op),
        }
    }

    fn access_hit(&mut self, index: usize, way: usize, op: Op) -> BusAction {
        self.sets[index].blocks[way].set_last_used(self.cycle);
        match op {
            Op::Read => {
                self.stats.read_hits += 1;
                BusAction::NoAction
            },
            Op::Write => {
                self.stats.write_hits += 1;
                match self.line(index, way).state() {
                    CoherenceState::Exclusive if self.protocol.has_silent_upgrade() => {
                        self.stats.silent_upgrades += 1;
                    },
                    CoherenceState::Shared | CoherenceState::Owned => {
                        self.stats.get_m_msgs += 1;
                    },
                    _ => (),
                }
                self.transition(index, way, CoherenceState::Modified);
                BusAction::Modified
            },
        }
    }

    fn access_miss(&mut self, addr: Addr, op: Op) -> BusAction {
        // a miss always goes to the bus: getS for reads, getM for writes
        match op {
            Op::Read => {
                self.stats.read_misses += 1;
                self.stats.get_s_msgs += 1;
            },
            Op::Write => {
                self.stats.write_misses += 1;
                self.stats.get_m_msgs += 1;
            },
        }
        let (index, _) = addr.pos(&self.geo);
        let way = self.fill_line(addr);
        match op {
            Op::Write => {
                self.transition(index, way, CoherenceState::Modified);
                BusAction::Modified
            },
            Op::Read => match self.protocol {
                Protocol::Msi => BusAction::Shared,
                p => BusAction::PollExclusive(p),
            },
        }
    }

    /// Reaction to another processor's bus action for `addr`.
    ///
    /// Write-backs are counted here; the returned deltas are left for the
    /// coordinator to fold into the statistics.
    pub fn snoop(&mut self, action: BusAction, addr: Addr) -> SnoopResponse {
        if !self.accepts(action) {
            error!("cache {} ({}) cannot snoop {:?}, ignoring", self.id, self.protocol, action);
            return SnoopResponse::default();
        }
        let Some((index, way)) = self.find_line(&addr) else {
            // no copy: never contend for exclusivity
            return SnoopResponse { ack: action.needs_resolve(), ..Default::default() };
        };
        let state = self.line(index, way).state();
        let r = react(self.protocol, action, state);
        trace!("cache {}: snoop {:?} on {}: {:?} -> {:?}", self.id, action, addr, state, r.next);

        if r.write_back {
            let tag = self.line(index, way).tag();
            self.write_back(self.geo.line_addr(tag, index));
        }
        if r.next != state {
            self.transition(index, way, r.next);
        }
        SnoopResponse {
            ack: false,
            deltas: StatDeltas {
                peer_serviced: r.supply as u64,
                memory_serviced: r.memory as u64,
                invalidations: (r.next == CoherenceState::Invalid) as u64,
            },
        }
    }

    /// Settles the requester's line once every peer has snooped.
    ///
    /// Only read polls need this: the line becomes Exclusive when no peer holds
    /// a copy (and the protocol has the state), Shared otherwise. Memory is
    /// credited with the service whenever no peer supplied the block.
    pub fn resolve(
        &mut self,
        summary: &SnoopSummary,
        processors: usize,
        addr: Addr,
        action: BusAction,
    ) -> StatDeltas {
        if !action.needs_resolve() {
            return StatDeltas::default();
        }
        if !self.accepts(action) {
            error!("cache {} ({}) cannot resolve {:?}, ignoring", self.id, self.protocol, action);
            return StatDeltas::default();
        }
        let Some((index, way)) = self.find_line(&addr) else {
            error!("cache {}: resolving {} which is not cached", self.id, addr);
            return StatDeltas::default();
        };
        let alone = summary.acks + 1 == processors;
        let next = if alone && self.protocol.allows(CoherenceState::Exclusive) {
            CoherenceState::Exclusive
        } else {
            CoherenceState::Shared
        };
        self.transition(index, way, next);
        StatDeltas {
            memory_serviced: !summary.peer_supplied as u64,
            ..Default::default()
        }
    }

    pub(crate) fn apply(&mut self, deltas: &StatDeltas) {
        self.stats.apply(deltas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CoherenceState::*;

    fn one_set(assoc: u64, protocol: Protocol) -> Cache {
        let spec = SystemSpec { cache_size: 4 * assoc, block_size: 4, cache_assoc: assoc, num_procs: 1, protocol };
        Cache::new(0, protocol, spec.validate().unwrap())
    }

    // with a single set of 4-byte blocks, tag n lives at address 4n
    fn addr(tag: u64) -> Addr {
        Addr(tag << 2)
    }

    #[test]
    fn lru_tie_goes_to_highest_way() {
        let mut cache = one_set(4, Protocol::Msi);
        for (way, used) in [5, 2, 2, 9].into_iter().enumerate() {
            let line = &mut cache.sets[0].blocks[way];
            line.set_tag(way as u64 + 1);
            line.set_state(Shared);
            line.set_last_used(used);
        }
        cache.cycle = 10;
        assert_eq!(cache.find_victim(addr(42)), 2);
        assert_eq!(cache.sets[0].blocks[2].last_used(), 10);
        // way 1 is now the unique minimum
        assert_eq!(cache.find_victim(addr(42)), 1);
    }

    #[test]
    fn invalid_way_is_evicted_first() {
        let mut cache = one_set(4, Protocol::Mesi);
        for (way, used) in [7, 1, 3, 0].into_iter().enumerate() {
            let line = &mut cache.sets[0].blocks[way];
            line.set_tag(way as u64);
            line.set_state(Modified);
            line.set_last_used(used);
        }
        cache.sets[0].blocks[2].invalidate();
        assert_eq!(cache.find_victim(addr(99)), 2);
    }

    #[test]
    fn evicting_modified_line_writes_back() {
        let mut cache = one_set(2, Protocol::Msi);
        assert_eq!(cache.access(addr(1), Op::Write), BusAction::Modified);
        assert_eq!(cache.access(addr(2), Op::Read), BusAction::Shared);
        assert_eq!(cache.stats().writebacks(), 0);
        // tag 1 is the least recently used and dirty
        cache.access(addr(3), Op::Read);
        assert_eq!(cache.stats().writebacks(), 1);
        assert_eq!(cache.stats().memory_transfers(), 1);
        assert_eq!(cache.state_of(addr(1)), Invalid);
        // evicting a clean line does not
        cache.access(addr(4), Op::Read);
        assert_eq!(cache.stats().writebacks(), 1);
    }

    #[test]
    fn silent_upgrade_only_from_exclusive() {
        for protocol in Protocol::ALL {
            let mut cache = one_set(1, protocol);
            cache.access(addr(1), Op::Read);
            let held = if protocol.allows(Exclusive) { Exclusive } else { Shared };
            cache.transition(0, 0, held);
            cache.access(addr(1), Op::Write);
            let s = cache.stats();
            assert_eq!(cache.state_of(addr(1)), Modified);
            if protocol.has_silent_upgrade() {
                assert_eq!((s.silent_upgrades(), s.get_m_msgs()), (1, 0), "{protocol}");
            } else {
                assert_eq!((s.silent_upgrades(), s.get_m_msgs()), (0, 1), "{protocol}");
            }
        }
    }

    #[test]
    fn write_miss_always_sends_get_m() {
        for protocol in Protocol::ALL {
            let mut cache = one_set(1, protocol);
            assert_eq!(cache.access(addr(1), Op::Write), BusAction::Modified);
            assert_eq!(cache.stats().get_m_msgs(), 1);
            assert_eq!(cache.stats().silent_upgrades(), 0);
            assert_eq!(cache.state_of(addr(1)), Modified);
        }
    }

    #[test]
    fn read_miss_polls_except_under_msi() {
        let expect = [
            (Protocol::Msi, BusAction::Shared),
            (Protocol::Mesi, BusAction::PollExclusive(Protocol::Mesi)),
            (Protocol::Mosi, BusAction::PollExclusive(Protocol::Mosi)),
            (Protocol::Moesi, BusAction::PollExclusive(Protocol::Moesi)),
        ];
        for (protocol, action) in expect {
            let mut cache = one_set(1, protocol);
            assert_eq!(cache.access(addr(1), Op::Read), action);
            assert_eq!(cache.state_of(addr(1)), Shared);
            assert_eq!(cache.stats().get_s_msgs(), 1);
        }
    }

    #[test]
    fn snoop_table() {
        use BusAction as B;
        use Protocol::*;
        let poll = |p| B::PollExclusive(p);
        // (protocol, action, before, after, supply, memory, write back)
        let table = [
            (Msi, B::Modified, Shared, Invalid, false, false, false),
            (Msi, B::Modified, Modified, Invalid, true, false, false),
            (Msi, B::Shared, Shared, Shared, false, true, false),
            (Msi, B::Shared, Modified, Shared, true, false, true),
            (Mesi, B::Modified, Shared, Invalid, false, true, false),
            (Mesi, B::Modified, Exclusive, Invalid, true, false, false),
            (Mesi, B::Modified, Modified, Invalid, true, false, false),
            (Mesi, poll(Mesi), Shared, Shared, false, false, false),
            (Mesi, poll(Mesi), Exclusive, Shared, true, false, false),
            (Mesi, poll(Mesi), Modified, Shared, true, false, true),
            (Mosi, B::Modified, Shared, Invalid, false, false, false),
            (Mosi, B::Modified, Owned, Invalid, true, false, false),
            (Mosi, B::Modified, Modified, Invalid, true, false, false),
            (Mosi, poll(Mosi), Shared, Shared, false, false, false),
            (Mosi, poll(Mosi), Owned, Owned, true, false, false),
            (Mosi, poll(Mosi), Modified, Owned, true, false, false),
            (Moesi, B::Modified, Shared, Invalid, false, false, false),
            (Moesi, B::Modified, Exclusive, Invalid, true, false, false),
            (Moesi, B::Modified, Owned, Invalid, true, false, false),
            (Moesi, B::Modified, Modified, Invalid, true, false, false),
            (Moesi, poll(Moesi), Shared, Shared, false, false, false),
            (Moesi, poll(Moesi), Exclusive, Shared, true, false, false),
            (Moesi, poll(Moesi), Owned, Owned, true, false, false),
            (Moesi, poll(Moesi), Modified, Owned, true, false, false),
        ];
        for (protocol, action, before, next, supply, memory, write_back) in table {
            assert_eq!(
                react(protocol, action, before),
                Reaction { next, supply, memory, write_back },
                "{protocol} {action:?} on {before:?}",
            );
        }
    }

    #[test]
    fn snoop_without_copy_acks_polls_only() {
        let mut cache = one_set(1, Protocol::Mesi);
        assert!(cache.snoop(BusAction::PollExclusive(Protocol::Mesi), addr(1)).ack);
        assert!(!cache.snoop(BusAction::Modified, addr(1)).ack);
        assert_eq!(cache.state_of(addr(1)), Invalid);
    }

    #[test]
    fn mismatched_protocol_changes_nothing() {
        let mut cache = one_set(1, Protocol::Mosi);
        cache.access(addr(1), Op::Write);
        let resp = cache.snoop(BusAction::PollExclusive(Protocol::Mesi), addr(1));
        assert_eq!(resp, SnoopResponse::default());
        let resp = cache.snoop(BusAction::Shared, addr(1));
        assert_eq!(resp, SnoopResponse::default());
        assert_eq!(cache.state_of(addr(1)), Modified);
        assert_eq!(cache.stats().writebacks(), 0);
    }

    #[test]
    fn resolve_picks_exclusive_only_when_alone() {
        let summary = |acks, peer_supplied| SnoopSummary { acks, peer_supplied, memory_serviced: false };
        for protocol in [Protocol::Mesi, Protocol::Mosi, Protocol::Moesi] {
            let action = BusAction::PollExclusive(protocol);

            let mut cache = one_set(1, protocol);
            assert_eq!(cache.access(addr(1), Op::Read), action);
            let deltas = cache.resolve(&summary(3, false), 4, addr(1), action);
            let alone = if protocol.allows(Exclusive) { Exclusive } else { Shared };
            assert_eq!(cache.state_of(addr(1)), alone);
            assert_eq!(deltas.memory_serviced, 1);

            let mut cache = one_set(1, protocol);
            cache.access(addr(1), Op::Read);
            let deltas = cache.resolve(&summary(2, true), 4, addr(1), action);
            assert_eq!(cache.state_of(addr(1)), Shared);
            assert_eq!(deltas.memory_serviced, 0);
        }
    }
}
