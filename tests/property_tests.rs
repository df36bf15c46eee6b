//! Property-based tests using proptest
//!
//! These tests validate framing and dispatch invariants across randomly
//! generated frames and arbitrary read boundaries.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use multiplayer_transport::core::codec::PacketCodec;
use multiplayer_transport::core::packet::Packet;
use multiplayer_transport::protocol::{DispatchQueue, RegistryBuilder};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use tokio_util::codec::Decoder;

fn encode(id: i32, fields: &[u8]) -> Vec<u8> {
    let mut packet = Packet::with_id(id);
    packet.write_bytes(fields);
    packet.insert_length_prefix();
    packet.into_bytes()
}

/// Feed `stream` to a codec in chunks whose sizes cycle through `cuts`.
fn decode_chunked(stream: &[u8], cuts: &[usize]) -> Vec<Packet> {
    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    let mut offset = 0;
    let mut cut = 0;

    while offset < stream.len() {
        let size = cuts[cut % cuts.len()].min(stream.len() - offset);
        buf.extend_from_slice(&stream[offset..offset + size]);
        offset += size;
        cut += 1;

        while let Some(frame) = codec.decode(&mut buf).expect("decode should not fail") {
            frames.push(frame);
        }
    }
    frames
}

fn frames_strategy() -> impl Strategy<Value = Vec<(i32, Vec<u8>)>> {
    prop::collection::vec(
        (1..64i32, prop::collection::vec(any::<u8>(), 0..256)),
        1..20,
    )
}

// Property: any fragmentation of N frames yields exactly N frames, in order
proptest! {
    #[test]
    fn prop_fragmentation_preserves_frames(
        frames in frames_strategy(),
        cuts in prop::collection::vec(1..64usize, 1..16),
    ) {
        let stream: Vec<u8> = frames.iter().flat_map(|(id, fields)| encode(*id, fields)).collect();

        let decoded = decode_chunked(&stream, &cuts);
        prop_assert_eq!(decoded.len(), frames.len());

        for (mut frame, (id, fields)) in decoded.into_iter().zip(frames) {
            prop_assert_eq!(frame.read_i32().unwrap(), id);
            prop_assert_eq!(frame.unread(), &fields[..]);
        }
    }
}

// Property: a whole stream in one read decodes the same as byte-at-a-time
proptest! {
    #[test]
    fn prop_single_read_equals_bytewise(frames in frames_strategy()) {
        let stream: Vec<u8> = frames.iter().flat_map(|(id, fields)| encode(*id, fields)).collect();

        let whole = decode_chunked(&stream, &[stream.len().max(1)]);
        let bytewise = decode_chunked(&stream, &[1]);
        prop_assert_eq!(whole, bytewise);
    }
}

// Property: a non-positive length discards its read without corrupting later frames
proptest! {
    #[test]
    fn prop_malformed_length_self_heals(
        bad_len in i32::MIN..=0,
        garbage in prop::collection::vec(any::<u8>(), 0..32),
        frames in frames_strategy(),
    ) {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();

        // One read carrying the bad header and whatever follows it.
        buf.extend_from_slice(&bad_len.to_le_bytes());
        buf.extend_from_slice(&garbage);
        prop_assert!(codec.decode(&mut buf).unwrap().is_none());
        prop_assert!(buf.is_empty());

        // Subsequent reads frame normally.
        for (id, fields) in &frames {
            buf.extend_from_slice(&encode(*id, fields));
        }
        let mut count = 0;
        while let Some(mut frame) = codec.decode(&mut buf).unwrap() {
            prop_assert_eq!(frame.read_i32().unwrap(), frames[count].0);
            count += 1;
        }
        prop_assert_eq!(count, frames.len());
    }
}

// Property: every enqueued action runs exactly once, in order; a second drain runs none
proptest! {
    #[test]
    fn prop_dispatch_queue_order(values in prop::collection::vec(any::<u32>(), 0..200)) {
        let queue = DispatchQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for &value in &values {
            let seen = seen.clone();
            queue.enqueue(move || seen.lock().unwrap().push(value));
        }

        prop_assert_eq!(queue.drain_and_run_all(), values.len());
        prop_assert_eq!(&*seen.lock().unwrap(), &values);
        prop_assert_eq!(queue.drain_and_run_all(), 0);
    }
}

// Property: registry dispatch reads fields exactly as they were written
proptest! {
    #[test]
    fn prop_fields_survive_dispatch(
        a in any::<i32>(),
        b in any::<f32>().prop_filter("finite", |v| v.is_finite()),
        flag in any::<bool>(),
        name in "[a-zA-Z0-9 ]{0,32}",
    ) {
        let seen = Arc::new(Mutex::new(None));
        let mut builder = RegistryBuilder::new();
        let sink = seen.clone();
        builder.register(7, move |packet| {
            let fields = (packet.read_i32()?, packet.read_f32()?, packet.read_bool()?, packet.read_string()?);
            *sink.lock().unwrap() = Some(fields);
            Ok(())
        });

        let mut packet = Packet::with_id(7);
        packet.write_i32(a);
        packet.write_f32(b);
        packet.write_bool(flag);
        packet.write_string(&name);
        builder.build().dispatch_frame(packet).unwrap();

        prop_assert_eq!(seen.lock().unwrap().clone(), Some((a, b, flag, name)));
    }
}

// Property: arbitrary bytes never panic the decoder
proptest! {
    #[test]
    fn prop_decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = PacketCodec::new(1024);
        let mut buf = BytesMut::from(&data[..]);
        while let Ok(Some(_)) = codec.decode(&mut buf) {}
    }
}
