//! Internal transmit-side queues.
//!
//! Two queues feed the wire: the byte FIFO accounting for serialized data
//! frames awaiting acknowledgement, and the bounded queue of outgoing link
//! frames. Link frames take scheduling priority, but both spend from the
//! same transport budget.

use std::collections::VecDeque;

use tautline_proto::{FrameId, FrameType};

/// Byte accounting for serialized in-flight data frames.
///
/// Frames enter when `send` accepts them and leave strictly in frame-id
/// order when a cumulative acknowledgement retires them. The queue tracks
/// `(frame_id, serialized length)` pairs; the bytes themselves live in the
/// transmit records. Retirement must match the front entry exactly - a
/// mismatch means the window and the buffer disagree, which the engine
/// treats as fatal.
#[derive(Debug)]
pub(crate) struct TxFifo {
    entries: VecDeque<(FrameId, usize)>,
    used: usize,
    capacity: usize,
}

/// Detail of a retirement that did not match the FIFO front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FifoMismatch {
    pub expected: Option<(FrameId, usize)>,
    pub got: (FrameId, usize),
}

impl TxFifo {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), used: 0, capacity }
    }

    pub(crate) fn fits(&self, len: usize) -> bool {
        self.used + len <= self.capacity
    }

    pub(crate) fn push(&mut self, frame_id: FrameId, len: usize) {
        debug_assert!(self.fits(len));
        self.entries.push_back((frame_id, len));
        self.used += len;
    }

    /// Retires the front frame, which must be exactly `(frame_id, len)`.
    pub(crate) fn pop(&mut self, frame_id: FrameId, len: usize) -> Result<(), FifoMismatch> {
        match self.entries.front().copied() {
            Some(front) if front == (frame_id, len) => {
                self.entries.pop_front();
                self.used -= len;
                Ok(())
            }
            expected => Err(FifoMismatch { expected, got: (frame_id, len) }),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }
}

/// Bounded queue of outgoing ACK/NACK/RESET frames.
///
/// When full, new signals are refused; every refused signal is recoverable
/// through retransmission or the reset retry timer.
#[derive(Debug)]
pub(crate) struct LinkQueue {
    frames: VecDeque<(FrameType, FrameId)>,
    depth: usize,
}

impl LinkQueue {
    pub(crate) fn new(depth: usize) -> Self {
        Self { frames: VecDeque::with_capacity(depth), depth }
    }

    /// Queues a signal. Returns `false` when the queue is full.
    #[must_use]
    pub(crate) fn push(&mut self, frame_type: FrameType, frame_id: FrameId) -> bool {
        if self.frames.len() == self.depth {
            return false;
        }
        self.frames.push_back((frame_type, frame_id));
        true
    }

    pub(crate) fn front(&self) -> Option<(FrameType, FrameId)> {
        self.frames.front().copied()
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop_front();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_accounts_bytes_in_order() {
        let mut fifo = TxFifo::new(100);
        fifo.push(FrameId::new(0), 40);
        fifo.push(FrameId::new(1), 40);
        assert!(!fifo.fits(40));
        assert_eq!(fifo.used(), 80);

        fifo.pop(FrameId::new(0), 40).unwrap();
        assert_eq!(fifo.used(), 40);
        assert!(fifo.fits(40));
    }

    #[test]
    fn fifo_rejects_out_of_order_retirement() {
        let mut fifo = TxFifo::new(100);
        fifo.push(FrameId::new(0), 30);
        fifo.push(FrameId::new(1), 30);

        let err = fifo.pop(FrameId::new(1), 30).unwrap_err();
        assert_eq!(err.expected, Some((FrameId::new(0), 30)));
        assert_eq!(err.got, (FrameId::new(1), 30));

        let err = fifo.pop(FrameId::new(0), 31).unwrap_err();
        assert_eq!(err.got, (FrameId::new(0), 31));
    }

    #[test]
    fn link_queue_refuses_when_full() {
        let mut queue = LinkQueue::new(2);
        assert!(queue.push(FrameType::AckAll, FrameId::new(1)));
        assert!(queue.push(FrameType::AckOne, FrameId::new(2)));
        assert!(!queue.push(FrameType::NackFrameId, FrameId::new(3)));

        assert_eq!(queue.front(), Some((FrameType::AckAll, FrameId::new(1))));
        queue.pop();
        queue.pop();
        assert!(queue.is_empty());
    }
}
