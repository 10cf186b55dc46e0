//! The two-peer simulation driver.

use std::cell::RefCell;
use std::rc::Rc;

use tautline_core::{ConfigError, LinkConfig};

use crate::invariants::{Violation, check_peer};
use crate::peer::{SimClock, SimPeer, SimPort};
use crate::wire::{FaultPlan, LossyWire};

/// Line capacity in each direction, modeling a UART transmit FIFO plus
/// driver buffer.
const WIRE_CAPACITY: usize = 4096;

/// Two peers joined by a bidirectional lossy line under a virtual clock.
///
/// `step` shuttles in-flight bytes, honors pending reset requests, runs one
/// service tick on each peer, and advances time. Everything is driven by the
/// seed: a failing case replays exactly.
pub struct LinkSim {
    clock: SimClock,
    config: LinkConfig,
    /// Peer "a".
    pub a: SimPeer,
    /// Peer "b".
    pub b: SimPeer,
    a_to_b: Rc<RefCell<LossyWire>>,
    b_to_a: Rc<RefCell<LossyWire>>,
}

impl LinkSim {
    /// Builds the simulation. Both directions of the line share the fault
    /// plan but draw from independent streams of the seed.
    pub fn new(seed: u64, config: LinkConfig, faults: FaultPlan) -> Result<Self, ConfigError> {
        let clock = SimClock::default();
        let a_to_b = Rc::new(RefCell::new(LossyWire::new(seed, WIRE_CAPACITY, faults)));
        let b_to_a =
            Rc::new(RefCell::new(LossyWire::new(seed.wrapping_add(1), WIRE_CAPACITY, faults)));

        let a = SimPeer::new(
            "a",
            SimPort::new(clock.clone(), Rc::clone(&a_to_b)),
            config.clone(),
        )?;
        let b = SimPeer::new(
            "b",
            SimPort::new(clock.clone(), Rc::clone(&b_to_a)),
            config.clone(),
        )?;
        Ok(Self { clock, config, a, b, a_to_b, b_to_a })
    }

    /// The shared virtual clock.
    #[must_use]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// One simulation step of `tick_ms` virtual milliseconds.
    pub fn step(&mut self, tick_ms: u32) {
        let inbound = self.b_to_a.borrow_mut().drain();
        if !inbound.is_empty() {
            self.a.link.ingest(&inbound);
        }
        let inbound = self.a_to_b.borrow_mut().drain();
        if !inbound.is_empty() {
            self.b.link.ingest(&inbound);
        }
        self.a.service();
        self.b.service();
        self.clock.advance(tick_ms);
    }

    /// Steps until both peers report connected, up to `max_ms`.
    /// Returns whether the handshake completed.
    pub fn connect(&mut self, tick_ms: u32, max_ms: u32) -> bool {
        let mut elapsed = 0;
        while elapsed < max_ms {
            if self.a.link.is_connected() && self.b.link.is_connected() {
                return true;
            }
            self.step(tick_ms);
            elapsed += tick_ms;
        }
        self.a.link.is_connected() && self.b.link.is_connected()
    }

    /// Runs for `total_ms` of virtual time.
    pub fn run(&mut self, tick_ms: u32, total_ms: u32) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.step(tick_ms);
            elapsed += tick_ms;
        }
    }

    /// Checks the structural invariants on both peers.
    pub fn check_invariants(&self) -> Result<(), Violation> {
        check_peer("a", &self.a.link.status(), self.a.link.config())?;
        check_peer("b", &self.b.link.status(), self.b.link.config())?;
        Ok(())
    }

    /// Total bytes the line lost or flipped in both directions.
    #[must_use]
    pub fn wire_faults(&self) -> (u64, u64) {
        let ab = self.a_to_b.borrow();
        let ba = self.b_to_a.borrow();
        (ab.dropped() + ba.dropped(), ab.corrupted() + ba.corrupted())
    }

    /// Replaces peer "b" with a factory-fresh instance, as if the device
    /// rebooted. Bytes already on the line stay there.
    pub fn reboot_b(&mut self) -> Result<(), ConfigError> {
        self.b = SimPeer::new(
            "b",
            SimPort::new(self.clock.clone(), Rc::clone(&self.b_to_a)),
            self.config.clone(),
        )?;
        Ok(())
    }
}
