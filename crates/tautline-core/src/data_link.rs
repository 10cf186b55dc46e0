//! The reliable data-link engine: Selective-Repeat ARQ over the deframer.
//!
//! The engine is single-threaded and cooperative. Every state transition
//! happens inside one of the public entry points (`send`, `ingest`,
//! `process`, `reset_tx`); nothing blocks, nothing spawns, and time is read
//! from the lower link so a harness can drive the whole machine under a
//! virtual clock. Integrators that share an instance across threads wrap it
//! in a single mutex.
//!
//! # Lifecycle
//!
//! Both peers boot disconnected and emit a reset request every sixteen
//! retransmit-timeouts. A peer receiving the request clears its receive
//! window, answers with a reset response, and raises
//! [`LinkEvent::RxResetRequest`] so its upper layer clears the send path;
//! the requester turns the response into [`LinkEvent::TxConnected`]. From
//! then on `send` assigns consecutive frame ids, `process` paces the wire,
//! and acknowledgements retire frames in order.

use bytes::{Bytes, BytesMut};
use tautline_proto::{
    Deframer, DeframerEvent, FrameId, FrameType, LINK_FRAME_LEN, data_wire_size, encode_data,
    encode_link,
};
use tracing::{debug, error, trace, warn};

use crate::config::LinkConfig;
use crate::error::{ConfigError, SendError};
use crate::link::{LinkEvent, LowerLink, UpperLayer};
use crate::queues::{LinkQueue, TxFifo};
use crate::status::{LinkStatus, RxStatus, TxStatus};

/// Reset requests are retried every this many retransmit-timeouts while
/// disconnected.
const RESET_RETRY_FACTOR: u32 = 16;

const RESET_REQUEST: FrameId = FrameId::ZERO;
const RESET_RESPONSE: FrameId = FrameId::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxSlot {
    /// No frame.
    Idle,
    /// Waiting for wire capacity (first emission or a retransmission).
    Send,
    /// On the wire, waiting for acknowledgement or timeout.
    Sent,
    /// Selectively acknowledged; retired once every earlier frame is.
    Acked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxSlot {
    Idle,
    /// Holds a stored future frame.
    Acked,
    /// Gap already announced with a NACK; no payload yet.
    Nacked,
}

#[derive(Debug)]
struct RxRecord {
    state: RxSlot,
    frame_id: FrameId,
    metadata: u32,
    payload: Bytes,
}

impl Default for RxRecord {
    fn default() -> Self {
        Self { state: RxSlot::Idle, frame_id: FrameId::ZERO, metadata: 0, payload: Bytes::new() }
    }
}

/// A reliable, in-order, at-most-once message link over a lossy byte stream.
///
/// Generic over the consumed byte transport `L`; the produced side is a
/// registered [`UpperLayer`]. See the crate docs for the driving contract:
/// feed received bytes to [`DataLink::ingest`] and call [`DataLink::process`]
/// at least every [`DataLink::service_interval_ms`] milliseconds.
pub struct DataLink<L: LowerLink> {
    ll: L,
    cfg: LinkConfig,
    deframer: Deframer,
    deframer_events: Vec<DeframerEvent>,
    upper: Option<Box<dyn UpperLayer>>,

    tx_state: TxState,
    tx_records: Vec<TxRecord>,
    tx_fifo: TxFifo,
    /// Oldest unacknowledged frame id.
    tx_last_id: FrameId,
    /// Next frame id to assign.
    tx_next_id: FrameId,
    link_queue: LinkQueue,
    /// Last reset request emission; `None` requests one immediately.
    reset_last_ms: Option<u32>,

    rx_records: Vec<RxRecord>,
    /// Next frame id to deliver.
    rx_next_id: FrameId,
    /// Highest frame id observed since the last receive reset.
    rx_max_id: FrameId,

    tx_stats: TxStatus,
    rx_stats: RxStatus,
}

#[derive(Debug)]
struct TxRecord {
    state: TxSlot,
    wire: Bytes,
    last_send_ms: u32,
    send_count: u32,
}

impl Default for TxRecord {
    fn default() -> Self {
        Self { state: TxSlot::Idle, wire: Bytes::new(), last_send_ms: 0, send_count: 0 }
    }
}

impl<L: LowerLink> DataLink<L> {
    /// Creates a disconnected link over `ll`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when `config` fails
    /// [`LinkConfig::normalized`].
    pub fn new(ll: L, config: LinkConfig) -> Result<Self, ConfigError> {
        let cfg = config.normalized()?;
        let tx_records = (0..cfg.tx_window).map(|_| TxRecord::default()).collect();
        let rx_records = (0..cfg.rx_window).map(|_| RxRecord::default()).collect();
        Ok(Self {
            ll,
            deframer: Deframer::new(),
            deframer_events: Vec::new(),
            upper: None,
            tx_state: TxState::Disconnected,
            tx_records,
            tx_fifo: TxFifo::new(cfg.tx_buffer_bytes),
            tx_last_id: FrameId::ZERO,
            tx_next_id: FrameId::ZERO,
            link_queue: LinkQueue::new(cfg.link_queue_depth),
            reset_last_ms: None,
            rx_records,
            rx_next_id: FrameId::ZERO,
            rx_max_id: FrameId::ZERO,
            tx_stats: TxStatus::default(),
            rx_stats: RxStatus::default(),
            cfg,
        })
    }

    /// Installs the event and message consumer.
    ///
    /// Messages received before registration are counted but discarded.
    pub fn register_upper(&mut self, upper: Box<dyn UpperLayer>) {
        self.upper = Some(upper);
    }

    /// The normalized configuration this link runs with.
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    /// The consumed byte transport.
    pub fn lower(&self) -> &L {
        &self.ll
    }

    /// Mutable access to the consumed byte transport.
    pub fn lower_mut(&mut self) -> &mut L {
        &mut self.ll
    }

    /// Whether the reset handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.tx_state == TxState::Connected
    }

    /// Queues one message for reliable delivery and returns immediately.
    ///
    /// The payload is copied; the frame stays in flight until acknowledged
    /// or until the link disconnects.
    ///
    /// # Errors
    ///
    /// - [`SendError::InvalidParameter`] - empty or >256-byte payload, or
    ///   metadata above 24 bits.
    /// - [`SendError::Disconnected`] - handshake not completed.
    /// - [`SendError::Full`] - window or byte buffer exhausted; retry after
    ///   the next service interval.
    pub fn send(&mut self, metadata: u32, payload: &[u8]) -> Result<(), SendError> {
        let wire_len = data_wire_size(payload.len());
        let frame_id = self.tx_next_id;

        // Validate parameters by encoding; nothing is committed on error.
        let mut buf = BytesMut::with_capacity(wire_len);
        encode_data(&mut buf, frame_id, metadata, payload)?;

        if self.tx_state != TxState::Connected {
            return Err(SendError::Disconnected);
        }
        let span = self.tx_next_id.dist(self.tx_last_id) as u16;
        if span >= LinkConfig::effective_window(self.cfg.tx_window) || !self.tx_fifo.fits(wire_len)
        {
            return Err(SendError::Full);
        }

        let now = self.ll.now_ms();
        let wire = buf.freeze();
        self.tx_fifo.push(frame_id, wire.len());
        let slot = &mut self.tx_records[frame_id.index(self.cfg.tx_window)];
        debug_assert_eq!(slot.state, TxSlot::Idle);
        *slot = TxRecord { state: TxSlot::Send, wire, last_send_ms: now, send_count: 0 };
        self.tx_next_id = self.tx_next_id.step();

        self.tx_stats.data_frames += 1;
        self.tx_stats.bytes += payload.len() as u64;
        trace!(%frame_id, len = payload.len(), "queued data frame");
        Ok(())
    }

    /// Feeds bytes received from the transport through the deframer and the
    /// protocol. Deliveries and events fire from inside this call.
    pub fn ingest(&mut self, bytes: &[u8]) {
        let mut events = std::mem::take(&mut self.deframer_events);
        self.deframer.ingest(bytes, &mut events);
        for event in events.drain(..) {
            match event {
                DeframerEvent::Data { frame_id, metadata, payload } => {
                    self.on_data(frame_id, metadata, payload);
                }
                DeframerEvent::Link { frame_type, frame_id } => {
                    self.on_link(frame_type, frame_id);
                }
                DeframerEvent::FramingError => {
                    self.rx_stats.framing_errors += 1;
                    self.queue_link(FrameType::NackFramingError, self.rx_next_id);
                }
            }
        }
        self.deframer_events = events;
    }

    /// Service tick: drains pending link frames, retries the reset
    /// handshake, reverts timed-out frames, and transmits at most one data
    /// frame.
    pub fn process(&mut self) {
        let now = self.ll.now_ms();
        self.maybe_request_reset(now);
        self.flush_link_queue();
        self.expire_timeouts(now);
        self.transmit_one(now);
    }

    /// Upper bound, in milliseconds, until [`DataLink::process`] must run
    /// again.
    #[must_use]
    pub fn service_interval_ms(&self) -> u32 {
        if !self.link_queue.is_empty() {
            return 0;
        }
        let now = self.ll.now_ms();
        let mut interval = self.cfg.tx_timeout_ms;

        if self.tx_state == TxState::Disconnected {
            interval = interval.min(match self.reset_last_ms {
                None => 0,
                Some(last) => self.reset_retry_ms().saturating_sub(now.wrapping_sub(last)),
            });
        }

        let span = self.tx_next_id.dist(self.tx_last_id) as u16;
        for offset in 0..span {
            let id = self.tx_last_id.add(offset);
            let rec = &self.tx_records[id.index(self.cfg.tx_window)];
            match rec.state {
                TxSlot::Send => return 0,
                TxSlot::Sent => {
                    let elapsed = now.wrapping_sub(rec.last_send_ms);
                    interval = interval.min(self.cfg.tx_timeout_ms.saturating_sub(elapsed));
                }
                TxSlot::Idle | TxSlot::Acked => {}
            }
        }
        interval
    }

    /// Clears the transmit path: all records, the byte buffer, and the frame
    /// id counters. Called by the upper layer in response to
    /// [`LinkEvent::RxResetRequest`]; connection state is untouched because
    /// the peer that asked now has a fresh receive window expecting id 0.
    pub fn reset_tx(&mut self) {
        debug!("transmit path reset");
        for rec in &mut self.tx_records {
            *rec = TxRecord::default();
        }
        self.tx_fifo.clear();
        self.tx_last_id = FrameId::ZERO;
        self.tx_next_id = FrameId::ZERO;
    }

    /// A copy of every counter, plus the current window and buffer gauges.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        let mut tx = self.tx_stats;
        tx.window_occupancy = self.tx_next_id.dist(self.tx_last_id) as u16;
        tx.buffer_used = self.tx_fifo.used();
        LinkStatus { tx, rx: self.rx_stats, deframer: self.deframer.stats() }
    }

    /// Zeroes all counters. Gauges keep reflecting live state.
    pub fn status_clear(&mut self) {
        self.tx_stats.clear();
        self.rx_stats.clear();
        self.deframer.clear_stats();
    }

    // === transmit path ===

    fn reset_retry_ms(&self) -> u32 {
        self.cfg.tx_timeout_ms.saturating_mul(RESET_RETRY_FACTOR)
    }

    fn maybe_request_reset(&mut self, now: u32) {
        if self.tx_state == TxState::Connected {
            return;
        }
        let due = match self.reset_last_ms {
            None => true,
            Some(last) => now.wrapping_sub(last) >= self.reset_retry_ms(),
        };
        if due {
            debug!("requesting link reset");
            self.queue_link(FrameType::Reset, RESET_REQUEST);
            self.reset_last_ms = Some(now);
        }
    }

    fn flush_link_queue(&mut self) {
        while let Some((frame_type, frame_id)) = self.link_queue.front() {
            if self.ll.send_available() < LINK_FRAME_LEN {
                return;
            }
            let Ok(frame) = encode_link(frame_type, frame_id) else {
                // The queue only ever holds link types.
                self.link_queue.pop();
                continue;
            };
            self.ll.send(&frame);
            self.link_queue.pop();
            self.tx_stats.link_frames += 1;
        }
    }

    fn expire_timeouts(&mut self, now: u32) {
        let span = self.tx_next_id.dist(self.tx_last_id) as u16;
        for offset in 0..span {
            let id = self.tx_last_id.add(offset);
            let rec = &mut self.tx_records[id.index(self.cfg.tx_window)];
            if rec.state == TxSlot::Sent
                && now.wrapping_sub(rec.last_send_ms) >= self.cfg.tx_timeout_ms
            {
                trace!(frame_id = %id, "send timeout");
                rec.state = TxSlot::Send;
            }
        }
    }

    /// Transmits the oldest frame awaiting the wire, if it fits. One data
    /// frame per tick keeps link frames interleaved under back-pressure.
    fn transmit_one(&mut self, now: u32) {
        let span = self.tx_next_id.dist(self.tx_last_id) as u16;
        for offset in 0..span {
            let id = self.tx_last_id.add(offset);
            let slot = id.index(self.cfg.tx_window);
            if self.tx_records[slot].state != TxSlot::Send {
                continue;
            }
            let wire = self.tx_records[slot].wire.clone();
            if wire.len() > self.ll.send_available() {
                // The oldest frame that fits goes out; ids carry the order.
                continue;
            }
            self.ll.send(&wire);

            let rec = &mut self.tx_records[slot];
            rec.state = TxSlot::Sent;
            rec.last_send_ms = now;
            rec.send_count += 1;
            let send_count = rec.send_count;
            if send_count > 1 {
                self.tx_stats.retransmissions += 1;
            }
            if send_count > self.cfg.max_send_count {
                warn!(frame_id = %id, send_count, "send budget exhausted; disconnecting");
                self.reset_tx();
                self.tx_state = TxState::Disconnected;
                self.reset_last_ms = None;
                self.tx_stats.disconnects += 1;
                self.emit(LinkEvent::TxDisconnected);
            }
            return;
        }
    }

    fn queue_link(&mut self, frame_type: FrameType, frame_id: FrameId) {
        if !self.link_queue.push(frame_type, frame_id) {
            warn!(?frame_type, %frame_id, "outbound link queue full; signal dropped");
            self.tx_stats.link_drops += 1;
        }
    }

    // === receive path ===

    fn on_data(&mut self, id: FrameId, metadata: u32, payload: Bytes) {
        if id.dist(self.rx_max_id) > 0 {
            self.rx_max_id = id;
        }
        let window = LinkConfig::effective_window(self.cfg.rx_window);
        let d = id.dist(self.rx_next_id);

        if d == 0 {
            // The expected frame: deliver, then drain stored successors.
            let slot = id.index(self.cfg.rx_window);
            self.rx_records[slot] = RxRecord::default();
            self.deliver(metadata, &payload);
            self.rx_next_id = self.rx_next_id.step();

            loop {
                let slot = self.rx_next_id.index(self.cfg.rx_window);
                let rec = &self.rx_records[slot];
                if rec.state != RxSlot::Acked || rec.frame_id != self.rx_next_id {
                    break;
                }
                let rec = &mut self.rx_records[slot];
                let meta = rec.metadata;
                let stored = std::mem::take(&mut rec.payload);
                rec.state = RxSlot::Idle;
                self.deliver(meta, &stored);
                self.rx_next_id = self.rx_next_id.step();
            }
            self.queue_link(FrameType::AckAll, self.rx_next_id.back());
        } else if d < 0 {
            // Already delivered; the peer missed our acknowledgement.
            trace!(frame_id = %id, "duplicate data frame");
            self.rx_stats.duplicates += 1;
            self.queue_link(FrameType::AckAll, self.rx_next_id.back());
        } else if d as u16 >= window {
            warn!(frame_id = %id, next = %self.rx_next_id, "data frame beyond receive window");
            self.rx_stats.out_of_window += 1;
            self.queue_link(FrameType::NackFrameId, id);
        } else {
            // A future frame inside the window: announce every unannounced
            // gap below it, then store it.
            let mut gap = self.rx_next_id;
            while gap != id {
                let slot = gap.index(self.cfg.rx_window);
                if self.rx_records[slot].state == RxSlot::Idle {
                    self.rx_records[slot] = RxRecord {
                        state: RxSlot::Nacked,
                        frame_id: gap,
                        metadata: 0,
                        payload: Bytes::new(),
                    };
                    self.queue_link(FrameType::NackFrameId, gap);
                }
                gap = gap.step();
            }
            let slot = id.index(self.cfg.rx_window);
            if self.rx_records[slot].state != RxSlot::Acked {
                self.rx_records[slot] =
                    RxRecord { state: RxSlot::Acked, frame_id: id, metadata, payload };
            }
            // Even for a duplicate: the selective ack may have been lost.
            self.queue_link(FrameType::AckOne, id);
        }
    }

    fn on_link(&mut self, frame_type: FrameType, id: FrameId) {
        match frame_type {
            FrameType::Reset if id == RESET_REQUEST => self.on_reset_request(),
            FrameType::Reset => self.on_reset_response(),
            FrameType::AckAll => self.on_ack_all(id),
            FrameType::AckOne => self.on_ack_one(id),
            FrameType::NackFrameId | FrameType::NackFramingError => self.on_nack(id),
            FrameType::Data => {}
        }
    }

    fn reset_rx(&mut self) {
        for rec in &mut self.rx_records {
            *rec = RxRecord::default();
        }
        self.rx_next_id = FrameId::ZERO;
        self.rx_max_id = FrameId::ZERO;
    }

    fn on_reset_request(&mut self) {
        debug!("reset request received; clearing receive state");
        self.rx_stats.reset_requests += 1;
        self.reset_rx();
        self.queue_link(FrameType::Reset, RESET_RESPONSE);
        self.emit(LinkEvent::RxResetRequest);
    }

    fn on_reset_response(&mut self) {
        if self.tx_state == TxState::Disconnected {
            debug!("reset response received; link connected");
            // Anything earlier on the wire belongs to the peer's previous
            // session: the peer clears its transmit path before the
            // response, and the byte stream preserves order. Start the
            // receive window fresh so stale in-flight frames cannot be
            // mistaken for the new session's ids.
            self.reset_rx();
            self.tx_state = TxState::Connected;
            self.emit(LinkEvent::TxConnected);
        } else {
            trace!("ignoring reset response while connected");
        }
    }

    fn on_ack_all(&mut self, id: FrameId) {
        let span = self.tx_next_id.dist(self.tx_last_id);
        let d = id.dist(self.tx_last_id);
        if d < 0 || d >= span {
            // A stale ack for retired frames, or one from a previous
            // session.
            trace!(frame_id = %id, "spurious cumulative ack");
            self.tx_stats.spurious_acks += 1;
            return;
        }
        while id.dist(self.tx_last_id) >= 0 {
            let slot = self.tx_last_id.index(self.cfg.tx_window);
            if self.tx_records[slot].state == TxSlot::Idle {
                self.fault("acknowledged frame has no transmit record");
                return;
            }
            let len = self.tx_records[slot].wire.len();
            self.tx_records[slot] = TxRecord::default();
            if let Err(mismatch) = self.tx_fifo.pop(self.tx_last_id, len) {
                error!(?mismatch, "transmit buffer out of step with the window");
                self.fault("transmit buffer out of step with the window");
                return;
            }
            self.tx_last_id = self.tx_last_id.step();
        }
        trace!(up_to = %id, "retired acknowledged frames");
    }

    fn on_ack_one(&mut self, id: FrameId) {
        let span = self.tx_next_id.dist(self.tx_last_id) as u16;
        if !id.in_window(self.tx_last_id, span) {
            self.tx_stats.spurious_acks += 1;
            return;
        }
        let rec = &mut self.tx_records[id.index(self.cfg.tx_window)];
        if rec.state != TxSlot::Idle {
            rec.state = TxSlot::Acked;
        }
    }

    fn on_nack(&mut self, id: FrameId) {
        let span = self.tx_next_id.dist(self.tx_last_id) as u16;
        if !id.in_window(self.tx_last_id, span) {
            return;
        }
        let rec = &mut self.tx_records[id.index(self.cfg.tx_window)];
        if rec.state != TxSlot::Idle {
            trace!(frame_id = %id, "peer requested retransmission");
            rec.state = TxSlot::Send;
        }
    }

    fn deliver(&mut self, metadata: u32, payload: &[u8]) {
        self.rx_stats.data_frames += 1;
        self.rx_stats.bytes += payload.len() as u64;
        if let Some(upper) = self.upper.as_mut() {
            upper.on_message(metadata, payload);
        } else {
            trace!("no upper layer registered; message discarded");
        }
    }

    fn emit(&mut self, event: LinkEvent) {
        debug!(?event, "link event");
        if let Some(upper) = self.upper.as_mut() {
            upper.on_event(event);
        }
    }

    /// An internal invariant failed. Delivered data is never affected; the
    /// transmit path restarts from the handshake.
    fn fault(&mut self, reason: &'static str) {
        error!(reason, "internal fault; resetting transmit path");
        self.reset_tx();
        self.link_queue.clear();
        self.tx_state = TxState::Disconnected;
        self.reset_last_ms = None;
        self.emit(LinkEvent::InternalError);
    }
}
