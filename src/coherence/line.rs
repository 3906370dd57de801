use super::common::CoherenceState;

/// One way of a cache set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheLine {
    tag: u64,
    state: CoherenceState,
    last_used: u64,
}

impl CacheLine {
    pub fn is_valid(&self) -> bool {
        self.state != CoherenceState::Invalid
    }
    pub fn invalidate(&mut self) {
        self.tag = 0;
        self.state = CoherenceState::Invalid;
    }
    pub fn tag(&self) -> u64 { self.tag }
    pub fn set_tag(&mut self, tag: u64) { self.tag = tag; }
    pub fn state(&self) -> CoherenceState { self.state }
    pub fn set_state(&mut self, state: CoherenceState) { self.state = state; }
    pub fn last_used(&self) -> u64 { self.last_used }
    pub fn set_last_used(&mut self, cycle: u64) { self.last_used = cycle; }

    pub(crate) fn matches(&self, tag: u64) -> bool {
        self.is_valid() && self.tag == tag
    }
}
