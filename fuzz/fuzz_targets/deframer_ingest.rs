//! Fuzz target for the byte-stream deframer.
//!
//! Feeds arbitrary bytes in arbitrary chunk sizes and checks:
//! - the parser never panics on any input;
//! - emitted data frames always satisfy the wire constraints
//!   (payload 1..=256 bytes, metadata within 24 bits);
//! - the byte counter matches what was fed in.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tautline_proto::{Deframer, DeframerEvent, MAX_METADATA, MAX_PAYLOAD_LEN};

#[derive(Debug, Arbitrary)]
struct Input {
    stream: Vec<u8>,
    chunk: u8,
}

fuzz_target!(|input: Input| {
    let chunk = usize::from(input.chunk).max(1);
    let mut deframer = Deframer::new();
    let mut events = Vec::new();

    for piece in input.stream.chunks(chunk) {
        deframer.ingest(piece, &mut events);
    }

    for event in &events {
        if let DeframerEvent::Data { metadata, payload, .. } = event {
            assert!(!payload.is_empty() && payload.len() <= MAX_PAYLOAD_LEN);
            assert!(*metadata <= MAX_METADATA);
        }
    }
    assert_eq!(deframer.stats().bytes, input.stream.len() as u64);
});
