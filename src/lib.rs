/*
    A trace-driven simulator of snooping cache coherence (MSI, MESI, MOSI, MOESI)
    for a shared-bus multiprocessor with private caches.
 */

pub mod coherence;
pub mod report;
pub mod sim;
pub mod trace;

pub use coherence::{BusCoordinator, Protocol, SystemSpec};
