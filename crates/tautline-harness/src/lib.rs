//! Deterministic two-peer simulation harness for the tautline link.
//!
//! Everything here runs single-threaded under a virtual clock: a seeded
//! lossy line connects two [`DataLink`](tautline_core::DataLink) instances,
//! and the simulation advances in explicit ticks. A failing seed replays
//! byte for byte, which is what makes window and ordering bugs debuggable.
//!
//! The crate ships no `main`; the scenario and property tests under
//! `tests/` are its consumers.

mod invariants;
mod peer;
mod sim;
mod wire;

pub use invariants::{Violation, check_peer};
pub use peer::{PeerInbox, SimClock, SimPeer, SimPort};
pub use sim::LinkSim;
pub use wire::{FaultPlan, LossyWire};
