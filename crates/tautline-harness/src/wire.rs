//! A simulated serial line with deterministic fault injection.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Per-byte fault probabilities applied as bytes enter the line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultPlan {
    /// Probability that a byte vanishes in transit.
    pub drop_rate: f64,
    /// Probability that a byte arrives with one bit flipped.
    pub corrupt_rate: f64,
}

impl FaultPlan {
    /// A perfectly clean line.
    #[must_use]
    pub fn clean() -> Self {
        Self::default()
    }
}

/// One direction of the line: a bounded byte queue with faults.
///
/// Faults are applied at push time from a seeded RNG, so a given seed always
/// produces the same loss pattern. Bytes past the line's capacity are lost,
/// which models an overrun UART FIFO.
#[derive(Debug)]
pub struct LossyWire {
    queue: VecDeque<u8>,
    capacity: usize,
    rng: ChaCha8Rng,
    faults: FaultPlan,
    dropped: u64,
    corrupted: u64,
}

impl LossyWire {
    /// A line with the given capacity, seed, and fault plan.
    #[must_use]
    pub fn new(seed: u64, capacity: usize, faults: FaultPlan) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            rng: ChaCha8Rng::seed_from_u64(seed),
            faults,
            dropped: 0,
            corrupted: 0,
        }
    }

    /// Queues bytes for the far end, applying faults byte by byte.
    pub fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.queue.len() >= self.capacity {
                self.dropped += 1;
                continue;
            }
            if self.faults.drop_rate > 0.0 && self.rng.gen_bool(self.faults.drop_rate) {
                self.dropped += 1;
                continue;
            }
            let byte = if self.faults.corrupt_rate > 0.0
                && self.rng.gen_bool(self.faults.corrupt_rate)
            {
                self.corrupted += 1;
                let bit: u8 = self.rng.gen_range(0..8);
                byte ^ (1u8 << bit)
            } else {
                byte
            };
            self.queue.push_back(byte);
        }
    }

    /// Free capacity, as a transmitter would see it.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.queue.len()
    }

    /// Takes every byte currently in flight.
    pub fn drain(&mut self) -> Vec<u8> {
        self.queue.drain(..).collect()
    }

    /// Bytes lost to drops or overruns so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes delivered with a flipped bit so far.
    #[must_use]
    pub fn corrupted(&self) -> u64 {
        self.corrupted
    }
}
