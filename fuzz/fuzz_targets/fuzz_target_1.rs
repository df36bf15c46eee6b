#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use multiplayer_transport::core::codec::PacketCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Fuzz stream framing - test for panics, crashes, infinite loops
    let mut codec = PacketCodec::new(64 * 1024);
    let mut buf = BytesMut::new();
    for chunk in data.chunks(13) {
        buf.extend_from_slice(chunk);
        while let Ok(Some(_)) = codec.decode(&mut buf) {}
    }
});
