//! Reliable, in-order, at-most-once message delivery over a lossy byte
//! stream.
//!
//! The [`DataLink`] engine implements Selective-Repeat ARQ on top of the
//! `tautline-proto` framer: an 11-bit sliding window on both sides,
//! cumulative and selective acknowledgements, NACK-driven and timer-driven
//! retransmission, and a reset handshake that recovers from a peer reboot.
//! Messages carry up to 256 payload bytes plus 24 bits of caller metadata.
//!
//! # Driving the engine
//!
//! The engine is passive and single-threaded. The integrator owns the I/O
//! and the pacing:
//!
//! - bytes arriving from the transport go to [`DataLink::ingest`];
//! - [`DataLink::process`] runs on a timer, at least every
//!   [`DataLink::service_interval_ms`] milliseconds;
//! - outgoing messages enter through [`DataLink::send`], which never blocks
//!   and reports back-pressure as [`SendError::Full`];
//! - deliveries and lifecycle events arrive through a registered
//!   [`UpperLayer`].
//!
//! Wire damage never surfaces as an error: corrupted frames become counters
//! and retransmissions, and only a peer that stays silent through a frame's
//! whole send budget produces [`LinkEvent::TxDisconnected`].

mod config;
mod data_link;
mod error;
mod link;
mod queues;
mod status;

pub use config::{
    DEFAULT_MAX_SEND_COUNT, DEFAULT_RX_WINDOW, DEFAULT_TX_BUFFER_BYTES, DEFAULT_TX_TIMEOUT_MS,
    DEFAULT_TX_WINDOW, LinkConfig, WINDOW_CEILING,
};
pub use data_link::DataLink;
pub use error::{ConfigError, SendError};
pub use link::{LinkEvent, LowerLink, UpperLayer};
pub use status::{LinkStatus, RxStatus, TxStatus};
