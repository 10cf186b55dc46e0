//! Wire constants, frame taxonomy, and frame encoders.

use bytes::{BufMut, BytesMut};
use crc::{CRC_8_SMBUS, CRC_32_ISO_HDLC, Crc, Table};
use thiserror::Error;

use crate::frame_id::FrameId;

/// First start-of-frame byte. Chosen for autobaud (alternating bit pattern)
/// and reused as the trailing EOF/idle byte.
pub const SOF1: u8 = 0x55;

/// Second start-of-frame byte (line idle level).
pub const SOF2: u8 = 0x00;

/// Optional trailing byte on DATA frames; same value as [`SOF1`] so an idle
/// line flows straight into the next frame's preamble.
pub const EOF: u8 = SOF1;

/// Fixed size of a LINK frame: SOF pair, type/id cell, CRC-32.
pub const LINK_FRAME_LEN: usize = 8;

/// DATA-frame header: SOF pair, type/id cell, length, metadata, header CRC-8.
pub const DATA_HEADER_LEN: usize = 9;

/// Largest payload a single DATA frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Metadata is 24 bits of opaque caller data.
pub const MAX_METADATA: u32 = (1 << 24) - 1;

const CRC_LEN: usize = 4;

/// Serialized DATA-frame size for a given payload length (EOF included).
#[must_use]
pub const fn data_wire_size(payload_len: usize) -> usize {
    DATA_HEADER_LEN + payload_len + CRC_LEN + 1
}

/// Largest serialized frame the deframer must buffer.
pub const MAX_DATA_FRAME_LEN: usize = data_wire_size(MAX_PAYLOAD_LEN);

pub(crate) const HEADER_CRC: Crc<u8, Table<1>> = Crc::<u8, Table<1>>::new(&CRC_8_SMBUS);
pub(crate) const FRAME_CRC: Crc<u32, Table<1>> = Crc::<u32, Table<1>>::new(&CRC_32_ISO_HDLC);

/// The six-value frame taxonomy, encoded in the top three bits of byte 2.
///
/// Everything except [`FrameType::Data`] is a LINK frame: fixed eight bytes,
/// no payload, carrying only a frame id (or 0/1 for reset request/response).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// A user message with metadata and payload.
    Data = 0b000,
    /// Reset handshake. Frame id 0 requests, frame id 1 responds.
    Reset = 0b011,
    /// Cumulative acknowledgement of every frame up to and including the id.
    AckAll = 0b100,
    /// Selective acknowledgement of a single out-of-order frame.
    AckOne = 0b101,
    /// The carried frame id is missing or out of window at the receiver.
    NackFrameId = 0b110,
    /// A framing error occurred; the id is the receiver's next expected frame.
    NackFramingError = 0b111,
}

impl FrameType {
    /// The 3-bit wire encoding.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Decodes the 3-bit field. `None` for the two unassigned patterns.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b000 => Some(Self::Data),
            0b011 => Some(Self::Reset),
            0b100 => Some(Self::AckAll),
            0b101 => Some(Self::AckOne),
            0b110 => Some(Self::NackFrameId),
            0b111 => Some(Self::NackFramingError),
            _ => None,
        }
    }

    /// Whether this type travels in an 8-byte LINK frame.
    #[must_use]
    pub const fn is_link(self) -> bool {
        !matches!(self, Self::Data)
    }
}

/// Parameter errors from the frame constructors.
///
/// These are the only errors this crate surfaces; wire corruption on the
/// receive path is absorbed by the [`Deframer`](crate::Deframer) and reported
/// as events and counters instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Payload length outside `1..=256`.
    #[error("payload length {0} outside 1..=256")]
    PayloadLength(usize),

    /// Metadata has bits set above the low 24.
    #[error("metadata {0:#x} exceeds 24 bits")]
    Metadata(u32),

    /// A DATA type was passed to the LINK-frame constructor.
    #[error("{0:?} is not a link frame type")]
    NotLink(FrameType),
}

/// Checks DATA-frame parameters without encoding anything.
///
/// Upper layers call this before reserving buffer space for a send.
#[must_use]
pub const fn validate_data(metadata: u32, payload_len: usize) -> bool {
    payload_len >= 1 && payload_len <= MAX_PAYLOAD_LEN && metadata <= MAX_METADATA
}

const fn type_id_cell(frame_type: FrameType, frame_id: FrameId) -> [u8; 2] {
    let id = frame_id.raw();
    [(frame_type.bits() << 5) | ((id >> 8) as u8 & 0x07), (id & 0xFF) as u8]
}

/// Serializes a DATA frame (EOF included) into `dst`.
///
/// # Errors
///
/// [`EncodeError::PayloadLength`] or [`EncodeError::Metadata`] when the
/// parameters fail [`validate_data`]. Nothing is written on error.
pub fn encode_data(
    dst: &mut BytesMut,
    frame_id: FrameId,
    metadata: u32,
    payload: &[u8],
) -> Result<(), EncodeError> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadLength(payload.len()));
    }
    if metadata > MAX_METADATA {
        return Err(EncodeError::Metadata(metadata));
    }

    let mut header = [0u8; DATA_HEADER_LEN];
    header[0] = SOF1;
    header[1] = SOF2;
    header[2..4].copy_from_slice(&type_id_cell(FrameType::Data, frame_id));
    header[4] = (payload.len() - 1) as u8;
    header[5..8].copy_from_slice(&metadata.to_le_bytes()[..3]);
    header[8] = HEADER_CRC.checksum(&header[2..8]);

    let mut digest = FRAME_CRC.digest();
    digest.update(&header[2..]);
    digest.update(payload);
    let crc = digest.finalize();

    dst.reserve(data_wire_size(payload.len()));
    dst.put_slice(&header);
    dst.put_slice(payload);
    dst.put_u32_le(crc);
    dst.put_u8(EOF);
    Ok(())
}

/// Serializes an 8-byte LINK frame.
///
/// For [`FrameType::Reset`] the caller passes id 0 (request) or 1 (response);
/// for the ACK/NACK types the id is the data-frame id being signalled.
///
/// # Errors
///
/// [`EncodeError::NotLink`] when `frame_type` is [`FrameType::Data`].
pub fn encode_link(frame_type: FrameType, frame_id: FrameId) -> Result<[u8; LINK_FRAME_LEN], EncodeError> {
    if !frame_type.is_link() {
        return Err(EncodeError::NotLink(frame_type));
    }

    let mut frame = [0u8; LINK_FRAME_LEN];
    frame[0] = SOF1;
    frame[1] = SOF2;
    frame[2..4].copy_from_slice(&type_id_cell(frame_type, frame_id));
    let crc = FRAME_CRC.checksum(&frame[2..4]);
    frame[4..8].copy_from_slice(&crc.to_le_bytes());
    Ok(frame)
}
