use cachesim_smp::coherence::*;
use cachesim_smp::report;
use cachesim_smp::sim::EventSystem;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn specs(protocol: Protocol) -> SystemSpec {
    SystemSpec { cache_size: 128, block_size: 8, cache_assoc: 4, num_procs: 3, protocol }
}

#[test]
fn test_msi_scenario_event_driven() {
    let specs = SystemSpec { cache_size: 4, block_size: 4, cache_assoc: 1, num_procs: 2, protocol: Protocol::Msi };
    let mut system = EventSystem::new(specs).unwrap();
    system.request(0, Op::Write, Addr(0x0)).unwrap();
    system.request(1, Op::Read, Addr(0x0)).unwrap();
    let stats = system.stats().unwrap();
    assert_eq!(stats[0].writebacks(), 1);
    assert_eq!(stats[0].invalidations(), 0);
    assert_eq!(stats[0].serviced_from_peer(), 1);
    assert_eq!(
        system.states_of(Addr(0x0)).unwrap(),
        vec![CoherenceState::Shared, CoherenceState::Shared]
    );
}

#[test]
fn test_event_driven_matches_sequential() {
    for protocol in Protocol::ALL {
        let mut bus = BusCoordinator::new(specs(protocol)).unwrap();
        let mut system = EventSystem::new(specs(protocol)).unwrap();

        let mut rng = StdRng::seed_from_u64(0x2545_f491_4f6c_dd1d);
        for _ in 0..500 {
            let p = rng.gen_range(0..3);
            let op = if rng.gen_range(0..4) == 0 { Op::Write } else { Op::Read };
            let addr = Addr(rng.gen_range(0..40u64) * 8);

            let expected = bus.request(p, op, addr);
            assert_eq!(system.request(p, op, addr).unwrap(), expected, "{protocol}");
            assert_eq!(system.states_of(addr).unwrap(), bus.states_of(addr), "{protocol}");
        }
        assert_eq!(system.stats().unwrap(), report::collect(bus.caches()), "{protocol}");
    }
}
