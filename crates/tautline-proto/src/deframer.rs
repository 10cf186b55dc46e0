//! Byte-stream deframer with resynchronization.
//!
//! The deframer is a push parser: feed it whatever the transport produced,
//! in chunks of any size, and it emits frame events once whole frames have
//! accumulated. It holds at most one partial frame of buffered bytes.
//!
//! Recovery rules:
//!
//! - A failed data-frame header (bad CRC-8, reserved bits, unassigned type)
//!   discards a single byte and rescans, so a spurious SOF pair inside a
//!   corrupted frame cannot hide the valid frame that follows it.
//! - A failed frame CRC-32 behind a sound header discards the whole frame;
//!   the header CRC already vouched for the frame boundary.
//! - [`DeframerEvent::FramingError`] fires once per loss of synchronization,
//!   re-armed by the next good frame. Line noise between frames produces
//!   one event, not one per byte.

use bytes::Bytes;

use crate::frame_id::FrameId;
use crate::wire::{
    DATA_HEADER_LEN, FRAME_CRC, FrameType, HEADER_CRC, LINK_FRAME_LEN, SOF1, SOF2, data_wire_size,
};

/// One parsed frame, or a loss of synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeframerEvent {
    /// A valid DATA frame.
    Data {
        /// The frame's 11-bit sequence number.
        frame_id: FrameId,
        /// 24 bits of opaque caller metadata.
        metadata: u32,
        /// The payload, 1..=256 bytes.
        payload: Bytes,
    },
    /// A valid LINK frame (ACK / NACK / RESET).
    Link {
        /// The link frame type; never [`FrameType::Data`].
        frame_type: FrameType,
        /// The signalled frame id (0 or 1 for RESET).
        frame_id: FrameId,
    },
    /// Synchronization was lost; at least one frame is unrecoverable.
    FramingError,
}

/// Deframer counters. Monotonic except across [`Deframer::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeframerStats {
    /// Total bytes ingested.
    pub bytes: u64,
    /// Bytes skipped while hunting for a frame boundary (idle and EOF
    /// bytes included).
    pub ignored: u64,
    /// Times synchronization was lost.
    pub resyncs: u64,
    /// CRC-8 and CRC-32 comparison failures.
    pub crc_errors: u64,
    /// Valid DATA frames emitted.
    pub data_frames: u64,
    /// Valid LINK frames emitted.
    pub link_frames: u64,
}

enum Parse {
    NeedMore,
    Consumed(usize),
}

/// Resynchronizing frame parser over a lossy byte stream.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: Vec<u8>,
    desynced: bool,
    stats: DeframerStats,
}

impl Deframer {
    /// A deframer with empty state, synchronized to the (so far silent) line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops buffered bytes and zeroes the counters.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.desynced = false;
        self.stats = DeframerStats::default();
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> DeframerStats {
        self.stats
    }

    /// Zeroes the counters without touching parser state.
    pub fn clear_stats(&mut self) {
        self.stats = DeframerStats::default();
    }

    /// Ingests a chunk of received bytes, appending events to `events`.
    ///
    /// Chunk boundaries carry no meaning; a frame may arrive one byte at a
    /// time or many frames may arrive in one chunk.
    pub fn ingest(&mut self, bytes: &[u8], events: &mut Vec<DeframerEvent>) {
        self.stats.bytes += bytes.len() as u64;
        self.buf.extend_from_slice(bytes);

        let mut pos = 0;
        loop {
            let tail = &self.buf[pos..];
            if tail.is_empty() {
                break;
            }
            let Some(sof) = tail.iter().position(|&b| b == SOF1) else {
                self.stats.ignored += tail.len() as u64;
                pos = self.buf.len();
                break;
            };
            if sof > 0 {
                self.stats.ignored += sof as u64;
                pos += sof;
            }

            let tail = &self.buf[pos..];
            if tail.len() < 2 {
                break;
            }
            if tail[1] == SOF1 {
                // An idle or EOF byte flowing into the next preamble.
                self.stats.ignored += 1;
                pos += 1;
                continue;
            }
            if tail[1] != SOF2 {
                // A stray SOF1 inside noise; neither byte can start a frame.
                self.stats.ignored += 2;
                pos += 2;
                continue;
            }
            if tail.len() < 3 {
                break;
            }

            let cell = tail[2];
            let reserved_clear = cell & 0b0001_1000 == 0;
            let parse = match FrameType::from_bits(cell >> 5) {
                Some(FrameType::Data) if reserved_clear => self.parse_data(pos, events),
                Some(link_type) if reserved_clear => self.parse_link(pos, link_type, events),
                _ => {
                    self.lose_sync(events);
                    self.stats.ignored += 1;
                    Parse::Consumed(1)
                }
            };
            match parse {
                Parse::NeedMore => break,
                Parse::Consumed(n) => pos += n,
            }
        }
        self.buf.drain(..pos);
    }

    fn parse_data(&mut self, pos: usize, events: &mut Vec<DeframerEvent>) -> Parse {
        if self.buf.len() - pos < DATA_HEADER_LEN {
            return Parse::NeedMore;
        }
        let header = &self.buf[pos..pos + DATA_HEADER_LEN];
        if HEADER_CRC.checksum(&header[2..8]) != header[8] {
            self.stats.crc_errors += 1;
            self.lose_sync(events);
            self.stats.ignored += 1;
            return Parse::Consumed(1);
        }

        let payload_len = self.buf[pos + 4] as usize + 1;
        // Everything except the optional EOF, which belongs to the gap
        // between frames.
        let wire_len = data_wire_size(payload_len) - 1;
        if self.buf.len() - pos < wire_len {
            return Parse::NeedMore;
        }

        let frame = &self.buf[pos..pos + wire_len];
        let crc_at = wire_len - 4;
        let wire_crc =
            u32::from_le_bytes([frame[crc_at], frame[crc_at + 1], frame[crc_at + 2], frame[crc_at + 3]]);
        if FRAME_CRC.checksum(&frame[2..crc_at]) != wire_crc {
            self.stats.crc_errors += 1;
            self.lose_sync(events);
            return Parse::Consumed(wire_len);
        }

        let frame_id = FrameId::new((u16::from(frame[2] & 0x07) << 8) | u16::from(frame[3]));
        let metadata = u32::from_le_bytes([frame[5], frame[6], frame[7], 0]);
        let payload = Bytes::copy_from_slice(&frame[DATA_HEADER_LEN..DATA_HEADER_LEN + payload_len]);

        self.desynced = false;
        self.stats.data_frames += 1;
        events.push(DeframerEvent::Data { frame_id, metadata, payload });
        Parse::Consumed(wire_len)
    }

    fn parse_link(
        &mut self,
        pos: usize,
        frame_type: FrameType,
        events: &mut Vec<DeframerEvent>,
    ) -> Parse {
        if self.buf.len() - pos < LINK_FRAME_LEN {
            return Parse::NeedMore;
        }
        let frame = &self.buf[pos..pos + LINK_FRAME_LEN];
        let wire_crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let frame_id = FrameId::new((u16::from(frame[2] & 0x07) << 8) | u16::from(frame[3]));
        if FRAME_CRC.checksum(&frame[2..4]) != wire_crc {
            self.stats.crc_errors += 1;
            self.lose_sync(events);
            self.stats.ignored += 1;
            return Parse::Consumed(1);
        }
        if frame_type == FrameType::Reset && frame_id.raw() > 1 {
            // Reset frames only carry 0 (request) or 1 (response).
            self.lose_sync(events);
            self.stats.ignored += 1;
            return Parse::Consumed(1);
        }

        self.desynced = false;
        self.stats.link_frames += 1;
        events.push(DeframerEvent::Link { frame_type, frame_id });
        Parse::Consumed(LINK_FRAME_LEN)
    }

    fn lose_sync(&mut self, events: &mut Vec<DeframerEvent>) {
        if !self.desynced {
            self.desynced = true;
            self.stats.resyncs += 1;
            events.push(DeframerEvent::FramingError);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::wire::{encode_data, encode_link};

    fn data_frame(id: u16, metadata: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_data(&mut buf, FrameId::new(id), metadata, payload).unwrap();
        buf.to_vec()
    }

    fn ingest_all(deframer: &mut Deframer, bytes: &[u8]) -> Vec<DeframerEvent> {
        let mut events = Vec::new();
        deframer.ingest(bytes, &mut events);
        events
    }

    #[test]
    fn parses_data_frame() {
        let mut deframer = Deframer::new();
        let events = ingest_all(&mut deframer, &data_frame(7, 0x123456, &[1, 2, 3, 4, 5]));
        assert_eq!(
            events,
            vec![DeframerEvent::Data {
                frame_id: FrameId::new(7),
                metadata: 0x123456,
                payload: Bytes::from_static(&[1, 2, 3, 4, 5]),
            }]
        );
        assert_eq!(deframer.stats().data_frames, 1);
    }

    #[test]
    fn parses_link_frame() {
        let mut deframer = Deframer::new();
        let wire = encode_link(FrameType::NackFrameId, FrameId::new(0x155)).unwrap();
        let events = ingest_all(&mut deframer, &wire);
        assert_eq!(
            events,
            vec![DeframerEvent::Link {
                frame_type: FrameType::NackFrameId,
                frame_id: FrameId::new(0x155),
            }]
        );
    }

    #[test]
    fn one_byte_at_a_time() {
        let mut deframer = Deframer::new();
        let wire = data_frame(42, 9, &[0xAB; 256]);
        let mut events = Vec::new();
        for &b in &wire {
            deframer.ingest(&[b], &mut events);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DeframerEvent::Data { frame_id, payload, .. }
                if *frame_id == FrameId::new(42) && payload.len() == 256
        ));
    }

    #[test]
    fn back_to_back_frames_share_idle_bytes() {
        let mut deframer = Deframer::new();
        let mut wire = data_frame(0, 0, &[1]);
        wire.extend_from_slice(&[SOF1; 4]); // idle line
        wire.extend_from_slice(&data_frame(1, 0, &[2]));
        let events = ingest_all(&mut deframer, &wire);
        assert_eq!(events.len(), 2);
        assert_eq!(deframer.stats().resyncs, 0);
    }

    #[test]
    fn corrupted_header_does_not_hide_following_frame() {
        let mut deframer = Deframer::new();
        let mut bad = data_frame(3, 0, &[9, 9, 9]);
        bad[4] ^= 0xFF; // destroy the length field, header CRC now fails
        let good = data_frame(4, 0, &[1, 2]);

        let mut wire = bad;
        wire.extend_from_slice(&good);
        let events = ingest_all(&mut deframer, &wire);

        assert_eq!(events[0], DeframerEvent::FramingError);
        assert!(matches!(
            &events[1],
            DeframerEvent::Data { frame_id, .. } if *frame_id == FrameId::new(4)
        ));
        assert_eq!(deframer.stats().resyncs, 1);
    }

    #[test]
    fn payload_corruption_skips_exactly_one_frame() {
        let mut deframer = Deframer::new();
        let mut bad = data_frame(3, 0, &[9, 9, 9]);
        bad[10] ^= 0x01; // flip a payload bit, header stays sound
        bad.extend_from_slice(&data_frame(4, 0, &[1]));
        let events = ingest_all(&mut deframer, &bad);

        assert_eq!(events[0], DeframerEvent::FramingError);
        assert!(matches!(
            &events[1],
            DeframerEvent::Data { frame_id, .. } if *frame_id == FrameId::new(4)
        ));
    }

    #[test]
    fn noise_burst_emits_one_framing_error() {
        let mut deframer = Deframer::new();
        // Deterministic junk with plenty of 0x55 0x00 pairs in it.
        let noise: Vec<u8> = (0..600u32)
            .map(|i| if i % 7 == 0 { SOF1 } else { (i.wrapping_mul(31)) as u8 })
            .collect();
        let mut wire = noise;
        wire.extend_from_slice(&data_frame(0, 1, &[5]));

        let events = ingest_all(&mut deframer, &wire);
        let errors = events.iter().filter(|e| matches!(e, DeframerEvent::FramingError)).count();
        assert!(errors <= 1, "noise produced {errors} framing errors");
        assert!(matches!(events.last(), Some(DeframerEvent::Data { .. })));
    }

    #[test]
    fn reset_frame_id_must_be_request_or_response() {
        let mut deframer = Deframer::new();
        let wire = encode_link(FrameType::Reset, FrameId::new(2)).unwrap();
        let events = ingest_all(&mut deframer, &wire);
        assert_eq!(events, vec![DeframerEvent::FramingError]);

        deframer.reset();
        let wire = encode_link(FrameType::Reset, FrameId::new(1)).unwrap();
        let events = ingest_all(&mut deframer, &wire);
        assert_eq!(
            events,
            vec![DeframerEvent::Link { frame_type: FrameType::Reset, frame_id: FrameId::new(1) }]
        );
    }

    #[test]
    fn reset_clears_state_and_stats() {
        let mut deframer = Deframer::new();
        let _ = ingest_all(&mut deframer, &[0x01, 0x02, SOF1]);
        deframer.reset();
        assert_eq!(deframer.stats(), DeframerStats::default());
        // A frame straddling the reset boundary must not resurrect.
        let events = ingest_all(&mut deframer, &data_frame(0, 0, &[1])[2..]);
        assert!(events.is_empty() || events == vec![DeframerEvent::FramingError]);
    }
}
