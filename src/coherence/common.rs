use std::fmt;
use std::str::FromStr;

use thiserror::Error;

// system specs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemSpec {         // unit         reasonable defaults
    pub cache_size: u64,        // bytes        4096
    pub block_size: u64,        // bytes        32
    pub cache_assoc: u64,       // blocks       2
    pub num_procs: usize,       //              4
    pub protocol: Protocol,     //              MESI
}

impl Default for SystemSpec {
    fn default() -> Self {
        SystemSpec {
            cache_size: 4096,
            block_size: 32,
            cache_assoc: 2,
            num_procs: 4,
            protocol: Protocol::Mesi,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be a positive integer")]
    Zero(&'static str),
    #[error("{name} must be a power of two, got {value}")]
    NotPowerOfTwo { name: &'static str, value: u64 },
    #[error("cache size {size} is not divisible by block size {block} x associativity {assoc}")]
    Indivisible { size: u64, block: u64, assoc: u64 },
    #[error("unknown coherence protocol `{0}` (expected 0-3 or MSI, MESI, MOSI, MOESI)")]
    UnknownProtocol(String),
}

impl SystemSpec {
    /// Checks the parameters and derives the address slicing used by every cache.
    pub fn validate(&self) -> Result<Geometry, ConfigError> {
        if self.cache_size == 0 { return Err(ConfigError::Zero("cache size")); }
        if self.block_size == 0 { return Err(ConfigError::Zero("block size")); }
        if self.cache_assoc == 0 { return Err(ConfigError::Zero("associativity")); }
        if self.num_procs == 0 { return Err(ConfigError::Zero("number of processors")); }

        let frame = self.block_size
            .checked_mul(self.cache_assoc)
            .ok_or(ConfigError::Indivisible {
                size: self.cache_size,
                block: self.block_size,
                assoc: self.cache_assoc,
            })?;
        if self.cache_size % frame != 0 {
            return Err(ConfigError::Indivisible {
                size: self.cache_size,
                block: self.block_size,
                assoc: self.cache_assoc,
            });
        }
        let sets = self.cache_size / frame;
        for (name, value) in [
            ("block size", self.block_size),
            ("associativity", self.cache_assoc),
            ("number of sets", sets),
        ] {
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { name, value });
            }
        }

        Ok(Geometry {
            sets: sets as usize,
            assoc: self.cache_assoc as usize,
            offset_bits: self.block_size.trailing_zeros(),
            index_bits: sets.trailing_zeros(),
        })
    }
}

/// Bit-slicing of an address into (tag | index | block offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub sets: usize,
    pub assoc: usize,
    pub offset_bits: u32,
    pub index_bits: u32,
}

impl Geometry {
    fn index_mask(&self) -> u64 {
        (1u64 << self.index_bits) - 1
    }
    /// Reassembles the block address of a line from its tag and set index.
    pub fn line_addr(&self, tag: u64, index: usize) -> Addr {
        let tag_part = tag
            .checked_shl(self.offset_bits + self.index_bits)
            .unwrap_or(0);
        Addr(tag_part | ((index as u64) << self.offset_bits))
    }
}

// coherence protocols

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Msi,
    Mesi,
    Mosi,
    Moesi,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Msi, Protocol::Mesi, Protocol::Mosi, Protocol::Moesi];

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Msi => "MSI",
            Protocol::Mesi => "MESI",
            Protocol::Mosi => "MOSI",
            Protocol::Moesi => "MOESI",
        }
    }

    /// Numeric id as used by the reference command line (0:MSI 1:MESI 2:MOSI 3:MOESI).
    pub fn id(self) -> u8 {
        match self {
            Protocol::Msi => 0,
            Protocol::Mesi => 1,
            Protocol::Mosi => 2,
            Protocol::Moesi => 3,
        }
    }

    /// Which line states may legally appear under this protocol.
    pub fn allows(self, state: CoherenceState) -> bool {
        use CoherenceState::*;
        match state {
            Invalid | Shared | Modified => true,
            Exclusive => matches!(self, Protocol::Mesi | Protocol::Moesi),
            Owned => matches!(self, Protocol::Mosi | Protocol::Moesi),
        }
    }

    /// Whether a write hit may move Exclusive -> Modified without a bus message.
    pub fn has_silent_upgrade(self) -> bool {
        self.allows(CoherenceState::Exclusive)
    }
}

impl TryFrom<u8> for Protocol {
    type Error = ConfigError;
    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| ConfigError::UnknownProtocol(id.to_string()))
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u8>() {
            return Protocol::try_from(id);
        }
        Protocol::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownProtocol(s.to_string()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// line states

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoherenceState {
    #[default]
    Invalid,
    Shared,
    Exclusive,
    Owned,
    Modified,
}

impl CoherenceState {
    pub const ALL: [CoherenceState; 5] = [
        CoherenceState::Invalid,
        CoherenceState::Shared,
        CoherenceState::Exclusive,
        CoherenceState::Owned,
        CoherenceState::Modified,
    ];

    /// Modified, Exclusive and Owned may be held by at most one cache at a time.
    pub fn is_owning(self) -> bool {
        matches!(self, CoherenceState::Modified | CoherenceState::Exclusive | CoherenceState::Owned)
    }

    pub fn letter(self) -> char {
        match self {
            CoherenceState::Invalid => 'I',
            CoherenceState::Shared => 'S',
            CoherenceState::Exclusive => 'E',
            CoherenceState::Owned => 'O',
            CoherenceState::Modified => 'M',
        }
    }
}

// addresses

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr(pub u64);

impl Addr {
    /// get set index and tag of this address under the given geometry
    pub fn pos(&self, geo: &Geometry) -> (usize, u64) {
        let block = self.0 >> geo.offset_bits;
        let index = (block & geo.index_mask()) as usize;
        let tag = block.checked_shr(geo.index_bits).unwrap_or(0);
        (index, tag)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// processor operations

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

// MESSAGE TYPES

/// What a local access puts on the bus for the peers to snoop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAction {
    /// write request (getM); every other copy must go away
    Modified,
    /// MSI read request, no exclusivity to resolve
    Shared,
    /// read hit, nothing to broadcast
    NoAction,
    /// read miss whose final state depends on the peers' answers
    PollExclusive(Protocol),
}

impl BusAction {
    pub fn needs_resolve(&self) -> bool {
        matches!(self, BusAction::PollExclusive(_))
    }
}

/// Counter increments produced while serving one request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatDeltas {
    pub peer_serviced: u64,
    pub memory_serviced: u64,
    pub invalidations: u64,
}

impl std::ops::Add for StatDeltas {
    type Output = StatDeltas;
    fn add(mut self, rhs: StatDeltas) -> StatDeltas {
        self += rhs;
        self
    }
}

impl std::ops::AddAssign for StatDeltas {
    fn add_assign(&mut self, rhs: StatDeltas) {
        self.peer_serviced += rhs.peer_serviced;
        self.memory_serviced += rhs.memory_serviced;
        self.invalidations += rhs.invalidations;
    }
}

/// A peer's answer to a snooped bus action.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnoopResponse {
    /// the peer holds no copy and will not contend for exclusivity
    pub ack: bool,
    pub deltas: StatDeltas,
}

impl SnoopResponse {
    pub fn supplied(&self) -> bool {
        self.deltas.peer_serviced > 0
    }
    /// The part of the deltas that belongs to the snooping cache itself.
    pub fn local_deltas(&self) -> StatDeltas {
        StatDeltas { memory_serviced: 0, ..self.deltas }
    }
}

/// Aggregate of all peer responses to one request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnoopSummary {
    pub acks: usize,
    pub peer_supplied: bool,
    pub memory_serviced: bool,
}

impl SnoopSummary {
    pub fn absorb(&mut self, resp: &SnoopResponse) {
        if resp.ack { self.acks += 1; }
        self.peer_supplied |= resp.supplied();
        self.memory_serviced |= resp.deltas.memory_serviced > 0;
    }

    /// Memory service reported by peers counts once per request, on the requester.
    pub fn requester_deltas(&self) -> StatDeltas {
        StatDeltas {
            memory_serviced: self.memory_serviced as u64,
            ..Default::default()
        }
    }
}

impl FromIterator<SnoopResponse> for SnoopSummary {
    fn from_iter<I: IntoIterator<Item = SnoopResponse>>(iter: I) -> Self {
        let mut summary = SnoopSummary::default();
        for resp in iter {
            summary.absorb(&resp);
        }
        summary
    }
}
