//! A simulated peer: a data link bound to the virtual clock and one
//! direction of the line, with a recording upper layer.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tautline_core::{ConfigError, DataLink, LinkConfig, LinkEvent, LowerLink, UpperLayer};

use crate::wire::LossyWire;

/// Shared virtual millisecond clock.
///
/// `u32` milliseconds with wrapping, matching what a tick counter on an
/// embedded target provides.
#[derive(Debug, Clone, Default)]
pub struct SimClock(Rc<Cell<u32>>);

impl SimClock {
    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> u32 {
        self.0.get()
    }

    /// Advances the clock.
    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

/// The transport a [`SimPeer`] transmits through: the virtual clock plus the
/// outbound direction of the line.
#[derive(Debug)]
pub struct SimPort {
    clock: SimClock,
    wire: Rc<RefCell<LossyWire>>,
}

impl SimPort {
    pub(crate) fn new(clock: SimClock, wire: Rc<RefCell<LossyWire>>) -> Self {
        Self { clock, wire }
    }
}

impl LowerLink for SimPort {
    fn now_ms(&self) -> u32 {
        self.clock.now()
    }

    fn send(&mut self, bytes: &[u8]) {
        self.wire.borrow_mut().push(bytes);
    }

    fn send_available(&self) -> usize {
        self.wire.borrow().available()
    }
}

/// Everything a peer's upper layer observed.
#[derive(Debug, Default)]
pub struct PeerInbox {
    /// Delivered `(metadata, payload)` pairs, in delivery order.
    pub messages: Vec<(u32, Vec<u8>)>,
    /// Lifecycle events, in order.
    pub events: Vec<LinkEvent>,
    /// A reset request arrived and `reset_tx` has not run yet.
    pub tx_reset_pending: bool,
}

struct RecordingUpper(Rc<RefCell<PeerInbox>>);

impl UpperLayer for RecordingUpper {
    fn on_event(&mut self, event: LinkEvent) {
        let mut inbox = self.0.borrow_mut();
        if event == LinkEvent::RxResetRequest {
            inbox.tx_reset_pending = true;
        }
        inbox.events.push(event);
    }

    fn on_message(&mut self, metadata: u32, payload: &[u8]) {
        self.0.borrow_mut().messages.push((metadata, payload.to_vec()));
    }
}

/// One end of the simulated link.
pub struct SimPeer {
    /// The engine under test.
    pub link: DataLink<SimPort>,
    name: &'static str,
    inbox: Rc<RefCell<PeerInbox>>,
}

impl SimPeer {
    pub(crate) fn new(
        name: &'static str,
        port: SimPort,
        config: LinkConfig,
    ) -> Result<Self, ConfigError> {
        let mut link = DataLink::new(port, config)?;
        let inbox = Rc::new(RefCell::new(PeerInbox::default()));
        link.register_upper(Box::new(RecordingUpper(Rc::clone(&inbox))));
        Ok(Self { link, name, inbox })
    }

    /// This peer's name in the simulation ("a" or "b").
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Delivered messages so far, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<(u32, Vec<u8>)> {
        self.inbox.borrow().messages.clone()
    }

    /// Observed lifecycle events so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<LinkEvent> {
        self.inbox.borrow().events.clone()
    }

    /// Honors a pending reset request (the upper-layer contract), then runs
    /// one service tick.
    pub(crate) fn service(&mut self) {
        let pending = {
            let mut inbox = self.inbox.borrow_mut();
            std::mem::take(&mut inbox.tx_reset_pending)
        };
        if pending {
            tracing::debug!(peer = self.name, "honoring reset request");
            self.link.reset_tx();
        }
        self.link.process();
    }
}
