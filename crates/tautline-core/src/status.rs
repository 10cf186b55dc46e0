//! Link counters.
//!
//! Counters are monotonic until [`DataLink::status_clear`]; the two gauges
//! (`window_occupancy`, `buffer_used`) always reflect the current state and
//! are never cleared.
//!
//! [`DataLink::status_clear`]: crate::DataLink::status_clear

use tautline_proto::DeframerStats;

/// Transmit-side counters and gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStatus {
    /// Data frames accepted by `send`.
    pub data_frames: u64,
    /// Payload bytes accepted by `send`.
    pub bytes: u64,
    /// Data-frame emissions beyond each frame's first.
    pub retransmissions: u64,
    /// Link frames (ACK/NACK/RESET) put on the wire.
    pub link_frames: u64,
    /// Link frames dropped because the outbound queue was full.
    pub link_drops: u64,
    /// Acknowledgements outside the current window.
    pub spurious_acks: u64,
    /// Times the link gave up on a frame and disconnected.
    pub disconnects: u64,
    /// Gauge: frames currently in flight.
    pub window_occupancy: u16,
    /// Gauge: bytes of serialized frames currently buffered.
    pub buffer_used: usize,
}

impl TxStatus {
    pub(crate) fn clear(&mut self) {
        let (occupancy, buffer) = (self.window_occupancy, self.buffer_used);
        *self = Self { window_occupancy: occupancy, buffer_used: buffer, ..Self::default() };
    }
}

/// Receive-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStatus {
    /// Messages delivered upstream, in order, exactly once each.
    pub data_frames: u64,
    /// Payload bytes delivered upstream.
    pub bytes: u64,
    /// Data frames dropped as already delivered.
    pub duplicates: u64,
    /// Data frames dropped as beyond the receive window.
    pub out_of_window: u64,
    /// Framing errors reported by the deframer.
    pub framing_errors: u64,
    /// Reset requests received from the peer.
    pub reset_requests: u64,
}

impl RxStatus {
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A point-in-time copy of every counter the link keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// Transmit-side counters and gauges.
    pub tx: TxStatus,
    /// Receive-side counters.
    pub rx: RxStatus,
    /// Byte-level deframer counters.
    pub deframer: DeframerStats,
}
