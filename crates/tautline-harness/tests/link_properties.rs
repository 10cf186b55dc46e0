//! Property tests: the delivery guarantees must hold for any seed, load,
//! and (bounded) fault pattern.

use proptest::prelude::*;
use tautline_core::{LinkConfig, SendError};
use tautline_harness::{FaultPlan, LinkSim};

const TICK_MS: u32 = 10;

fn payload_for(index: usize) -> Vec<u8> {
    let len = (index * 13) % 256 + 1;
    vec![index as u8; len]
}

/// Feeds `count` messages through the link, retrying on back-pressure and
/// checking structural invariants at every step.
fn drive_to_completion(sim: &mut LinkSim, count: usize, max_ms: u32) -> Result<(), TestCaseError> {
    let mut queued = 0;
    let mut elapsed = 0;
    while sim.b.messages().len() < count {
        prop_assert!(
            elapsed < max_ms,
            "only {}/{count} messages delivered within {max_ms}ms",
            sim.b.messages().len()
        );
        if queued < count {
            match sim.a.link.send(queued as u32, &payload_for(queued)) {
                Ok(()) => queued += 1,
                Err(SendError::Full | SendError::Disconnected) => {}
                Err(err) => prop_assert!(false, "unexpected send error: {err}"),
            }
        }
        sim.step(TICK_MS);
        if let Err(violation) = sim.check_invariants() {
            prop_assert!(false, "invariant violated: {violation:?}");
        }
        elapsed += TICK_MS;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// In-order, exactly-once delivery for any seed, window size, load, and
    /// bounded fault rates.
    #[test]
    fn delivery_survives_random_fault_patterns(
        seed in any::<u64>(),
        window in prop::sample::select(vec![4u16, 16, 64]),
        count in 1usize..40,
        drop_permille in 0u32..25,
        corrupt_permille in 0u32..12,
    ) {
        let faults = FaultPlan {
            drop_rate: f64::from(drop_permille) / 1000.0,
            corrupt_rate: f64::from(corrupt_permille) / 1000.0,
        };
        let config = LinkConfig { tx_window: window, rx_window: window, ..LinkConfig::default() };
        let mut sim = LinkSim::new(seed, config, faults).unwrap();
        prop_assert!(sim.connect(TICK_MS, 240_000), "handshake failed under faults");

        drive_to_completion(&mut sim, count, 600_000)?;

        let delivered = sim.b.messages();
        prop_assert_eq!(delivered.len(), count);
        for (index, (metadata, payload)) in delivered.iter().enumerate() {
            prop_assert_eq!(*metadata, index as u32, "order broken at {}", index);
            prop_assert_eq!(payload.clone(), payload_for(index));
        }
    }

    /// Once the window drains, the byte FIFO must be exactly empty: every
    /// retired frame popped exactly the bytes it pushed.
    #[test]
    fn buffer_accounting_balances_after_retirement(
        seed in any::<u64>(),
        count in 1usize..20,
    ) {
        let faults = FaultPlan { drop_rate: 0.01, corrupt_rate: 0.005 };
        let mut sim = LinkSim::new(seed, LinkConfig::default(), faults).unwrap();
        prop_assert!(sim.connect(TICK_MS, 240_000));

        drive_to_completion(&mut sim, count, 600_000)?;

        // Let the last acknowledgements come home.
        let mut waited = 0;
        while sim.a.link.status().tx.window_occupancy > 0 {
            prop_assert!(waited < 120_000, "window never drained");
            sim.step(TICK_MS);
            waited += TICK_MS;
        }
        let status = sim.a.link.status();
        prop_assert_eq!(status.tx.buffer_used, 0);
        prop_assert_eq!(status.tx.window_occupancy, 0);
    }

    /// Arbitrary interleavings of sends, ticks, and peer reboots never break
    /// the structural invariants, and deliveries at b stay strictly ordered.
    #[test]
    fn random_schedules_keep_invariants(
        seed in any::<u64>(),
        ops in prop::collection::vec(
            (0u8..4, 1u8..6, prop::bool::weighted(0.03)),
            1..50,
        ),
    ) {
        let mut sim = LinkSim::new(seed, LinkConfig::default(), FaultPlan::clean()).unwrap();
        let mut metadata = 0u32;

        for (burst, ticks, reboot) in ops {
            for _ in 0..burst {
                if sim.a.link.send(metadata, &[metadata as u8]).is_ok() {
                    metadata += 1;
                }
            }
            for _ in 0..ticks {
                sim.step(TICK_MS);
                if let Err(violation) = sim.check_invariants() {
                    prop_assert!(false, "invariant violated: {violation:?}");
                }
            }
            if reboot {
                sim.reboot_b().unwrap();
            }
        }

        // Whatever was delivered arrived in strictly increasing order.
        let delivered: Vec<u32> = sim.b.messages().iter().map(|(meta, _)| *meta).collect();
        prop_assert!(
            delivered.windows(2).all(|pair| pair[0] < pair[1]),
            "deliveries out of order: {:?}",
            delivered
        );
    }
}
