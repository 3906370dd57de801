mod bus;
mod cache;
mod common;
mod line;
mod stats;

pub use bus::BusCoordinator;
pub use cache::{react, Cache, Reaction};
pub use common::*;
pub use line::CacheLine;
pub use stats::Statistics;
