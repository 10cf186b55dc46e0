//! Error types for the data-link core.
//!
//! Only caller mistakes and back-pressure surface as `Err`. Wire-level
//! corruption, out-of-window arrivals, and lost acknowledgements are absorbed
//! by the protocol: they show up as counters, retransmissions, and - after
//! exhausted retries - a [`LinkEvent::TxDisconnected`] event, never as an
//! error return.
//!
//! [`LinkEvent::TxDisconnected`]: crate::LinkEvent::TxDisconnected

use tautline_proto::EncodeError;
use thiserror::Error;

/// Errors returned by [`DataLink::send`](crate::DataLink::send).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// A caller-supplied value is out of range (payload length, metadata).
    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] EncodeError),

    /// The transmit window or the transmit byte buffer cannot take another
    /// frame right now. Retry after the next service interval.
    #[error("transmit window or buffer full")]
    Full,

    /// The peer connection is not established.
    #[error("link is not connected")]
    Disconnected,
}

impl SendError {
    /// Whether retrying the same call later can succeed without any other
    /// action by the caller.
    ///
    /// `Full` clears as acknowledgements retire in-flight frames.
    /// `Disconnected` clears only once the reset handshake completes, and
    /// `InvalidParameter` never does.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Errors from [`LinkConfig::normalized`](crate::LinkConfig::normalized).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A window size rounded above the 1024-record ceiling.
    #[error("window of {0} frames exceeds the 1024-record limit")]
    WindowTooLarge(u16),

    /// A window must hold at least one frame.
    #[error("window size must be nonzero")]
    WindowZero,

    /// The transmit byte buffer cannot hold even one maximum-size frame.
    #[error("transmit buffer of {got} bytes cannot hold a {need}-byte frame")]
    BufferTooSmall {
        /// Configured buffer size.
        got: usize,
        /// Size of a maximum serialized data frame.
        need: usize,
    },

    /// The retransmit timeout must be nonzero.
    #[error("retransmit timeout must be nonzero")]
    ZeroTimeout,
}
