//! Invariant checks over a running simulation.
//!
//! These capture what must hold at every step regardless of fault pattern,
//! not any particular scenario.

use tautline_core::{LinkConfig, LinkStatus};
use tautline_proto::MAX_WINDOW;

/// An invariant that failed, with enough context to debug the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Peer the violation was observed on.
    pub peer: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Checks the per-peer structural invariants against a status snapshot.
///
/// - The in-flight span never exceeds the configured window nor the
///   protocol's half-id-space bound.
/// - The transmit byte buffer never exceeds its configured capacity, and is
///   empty exactly when the window is.
pub fn check_peer(
    peer: &'static str,
    status: &LinkStatus,
    config: &LinkConfig,
) -> Result<(), Violation> {
    let occupancy = status.tx.window_occupancy;
    if occupancy > config.tx_window || occupancy > MAX_WINDOW {
        return Err(Violation {
            peer,
            message: format!(
                "window occupancy {occupancy} exceeds bound (tx_window={}, protocol max={MAX_WINDOW})",
                config.tx_window
            ),
        });
    }

    if status.tx.buffer_used > config.tx_buffer_bytes {
        return Err(Violation {
            peer,
            message: format!(
                "transmit buffer holds {} of {} bytes",
                status.tx.buffer_used, config.tx_buffer_bytes
            ),
        });
    }

    if (occupancy == 0) != (status.tx.buffer_used == 0) {
        return Err(Violation {
            peer,
            message: format!(
                "window ({occupancy} frames) and byte buffer ({} bytes) disagree about emptiness",
                status.tx.buffer_used
            ),
        });
    }

    Ok(())
}
