//! Property tests for frame-id arithmetic, the codec round trip, and
//! resynchronization after line noise.

use bytes::BytesMut;
use proptest::prelude::*;
use tautline_proto::{
    Deframer, DeframerEvent, FrameId, FrameType, MAX_METADATA, SOF1, data_wire_size, encode_data,
    encode_link,
};

fn ingest(deframer: &mut Deframer, bytes: &[u8]) -> Vec<DeframerEvent> {
    let mut events = Vec::new();
    deframer.ingest(bytes, &mut events);
    events
}

proptest! {
    #[test]
    fn distance_is_signed_modular_and_antisymmetric(a in 0u16..2048, b in 0u16..2048) {
        let (a, b) = (FrameId::new(a), FrameId::new(b));
        let d = a.dist(b);

        prop_assert!((-1024..1024).contains(&i32::from(d)));
        prop_assert_eq!(d == 0, a == b);
        // Antisymmetric except at the unrepresentable half-way point.
        if d == -1024 {
            prop_assert_eq!(b.dist(a), -1024);
        } else {
            prop_assert_eq!(b.dist(a), -d);
        }
        // Distance is consistent with stepping forward.
        if d >= 0 {
            prop_assert_eq!(b.add(d as u16), a);
        }
    }

    #[test]
    fn data_frames_round_trip_under_any_chunking(
        id in 0u16..2048,
        metadata in 0u32..=MAX_METADATA,
        payload in prop::collection::vec(any::<u8>(), 1..=256),
        chunk in 1usize..50,
    ) {
        let mut wire = BytesMut::new();
        encode_data(&mut wire, FrameId::new(id), metadata, &payload).unwrap();
        prop_assert_eq!(wire.len(), data_wire_size(payload.len()));

        let mut deframer = Deframer::new();
        let mut events = Vec::new();
        for piece in wire.chunks(chunk) {
            deframer.ingest(piece, &mut events);
        }

        prop_assert_eq!(events, vec![DeframerEvent::Data {
            frame_id: FrameId::new(id),
            metadata,
            payload: payload.into(),
        }]);
        prop_assert_eq!(deframer.stats().crc_errors, 0);
    }

    #[test]
    fn link_frames_round_trip(
        frame_type in prop::sample::select(vec![
            FrameType::AckAll,
            FrameType::AckOne,
            FrameType::NackFrameId,
            FrameType::NackFramingError,
        ]),
        id in 0u16..2048,
    ) {
        let wire = encode_link(frame_type, FrameId::new(id)).unwrap();
        let mut deframer = Deframer::new();
        let events = ingest(&mut deframer, &wire);
        prop_assert_eq!(events, vec![DeframerEvent::Link {
            frame_type,
            frame_id: FrameId::new(id),
        }]);
    }

    /// Injecting arbitrary noise ahead of valid traffic costs at most a
    /// bounded number of framing-error callbacks and never hides a frame
    /// that arrives after an idle gap.
    #[test]
    fn resynchronizes_after_noise(
        noise in prop::collection::vec(any::<u8>(), 270..=600),
        id in 0u16..2048,
        metadata in 0u32..=MAX_METADATA,
        payload in prop::collection::vec(any::<u8>(), 1..=64),
    ) {
        let mut frame = BytesMut::new();
        encode_data(&mut frame, FrameId::new(id), metadata, &payload).unwrap();

        // Noise, a first copy (which noise may clobber the start of), an
        // idle gap longer than any frame, then the retransmission.
        let mut stream = noise.clone();
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&[SOF1; 300]);
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&[SOF1; 4]);

        let mut deframer = Deframer::new();
        let events = ingest(&mut deframer, &stream);

        let delivered = events.iter().filter(|event| matches!(
            event,
            DeframerEvent::Data { frame_id, metadata: meta, payload: body }
                if *frame_id == FrameId::new(id)
                    && *meta == metadata
                    && body.as_ref() == payload.as_slice()
        )).count();
        prop_assert!(delivered >= 1, "valid frame lost after noise: {events:?}");

        let errors = events.iter().filter(|e| matches!(e, DeframerEvent::FramingError)).count();
        let bound = noise.len().div_ceil(8);
        prop_assert!(errors <= bound, "{errors} framing errors for {} noise bytes", noise.len());
    }
}
