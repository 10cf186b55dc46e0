//! The seams of the data link: the byte transport it consumes and the
//! message consumer it drives.
//!
//! Both sides are capability traits so the engine stays pure: time comes
//! from [`LowerLink::now_ms`], bytes go out through [`LowerLink::send`], and
//! deliveries go up through a registered [`UpperLayer`]. The harness swaps
//! in a virtual clock and an in-memory wire; production wraps a serial port.

/// The byte transport underneath the link (a UART driver, a socket, a
/// simulated wire).
///
/// The transport must preserve byte order and must not block; capacity is
/// advertised through [`LowerLink::send_available`] and the engine never
/// writes more than that in one service tick.
pub trait LowerLink {
    /// Monotonic milliseconds. Wraps around roughly every 49 days; the
    /// engine only ever computes wrapping deltas.
    fn now_ms(&self) -> u32;

    /// Queues bytes for transmission. The slice is only borrowed for the
    /// duration of the call.
    fn send(&mut self, bytes: &[u8]);

    /// Free transmit capacity in bytes.
    fn send_available(&self) -> usize;
}

/// Link lifecycle notifications delivered to the upper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The peer asked for a reset. The upper layer must call
    /// [`DataLink::reset_tx`](crate::DataLink::reset_tx) to clear its send
    /// path before queueing anything new.
    RxResetRequest,

    /// The reset handshake completed; sends will now be accepted.
    TxConnected,

    /// A frame exhausted its send budget; the transmit path was cleared and
    /// the link fell back to the reset handshake.
    TxDisconnected,

    /// An internal invariant failed. The transmit path was reset; delivered
    /// data is unaffected.
    InternalError,
}

/// Consumer of delivered messages and lifecycle events.
///
/// Callbacks run inside the engine's entry points (`ingest`, `process`),
/// on the caller's thread. They must not call back into the link.
pub trait UpperLayer {
    /// A lifecycle event.
    fn on_event(&mut self, event: LinkEvent);

    /// An in-order message delivery. `payload` is only valid for the
    /// duration of the call; copy it out to keep it.
    fn on_message(&mut self, metadata: u32, payload: &[u8]);
}
