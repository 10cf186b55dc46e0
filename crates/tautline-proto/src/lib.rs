//! Wire protocol for the tautline serial link.
//!
//! This crate is the byte-level half of the link: frame identifiers, frame
//! encoders, and the resynchronizing deframer. It is a pure codec - no I/O,
//! no clock, no allocation beyond the returned payload buffers - and it never
//! reports wire corruption as an error. Corruption surfaces as
//! [`DeframerEvent::FramingError`] plus counters, and the data-link layer
//! above turns that into retransmission.
//!
//! ## Frame format
//!
//! Two frame shapes share one header cell. `frame_type` occupies the top
//! three bits of byte 2, the 11-bit `frame_id` spans the low three bits of
//! byte 2 and all of byte 3, and bits 4:3 of byte 2 are reserved zero.
//!
//! ```text
//! LINK (8 bytes):
//! +------+------+---------------+--------+-------------------+
//! | 0x55 | 0x00 | type | id_hi  | id_lo  |   CRC-32 (LE)     |
//! +------+------+---------------+--------+-------------------+
//!
//! DATA (15..=270 bytes):
//! +------+------+---------------+--------+--------+------------+-------+
//! | 0x55 | 0x00 | type | id_hi  | id_lo  | len-1  |  metadata  | CRC-8 |
//! +------+------+---------------+--------+--------+------------+-------+
//! |           payload (1..=256 bytes)         |  CRC-32 (LE)   | 0x55  |
//! +-------------------------------------------+----------------+-------+
//! ```
//!
//! Multi-byte fields are little-endian. The CRC-32 covers everything between
//! the SOF pair and the CRC itself; the CRC-8 covers only the six data-header
//! bytes so the deframer can reject a corrupted length field before waiting
//! for a payload that will never arrive. The trailing `0x55` doubles as the
//! next frame's SOF1 on an idle line.

mod deframer;
mod frame_id;
mod wire;

pub use deframer::{Deframer, DeframerEvent, DeframerStats};
pub use frame_id::{FRAME_ID_SPAN, FrameId, MAX_WINDOW};
pub use wire::{
    DATA_HEADER_LEN, EOF, EncodeError, FrameType, LINK_FRAME_LEN, MAX_DATA_FRAME_LEN, MAX_METADATA,
    MAX_PAYLOAD_LEN, SOF1, SOF2, data_wire_size, encode_data, encode_link, validate_data,
};
