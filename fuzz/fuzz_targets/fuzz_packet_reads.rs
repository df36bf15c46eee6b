#![no_main]

use libfuzzer_sys::fuzz_target;
use multiplayer_transport::core::packet::Packet;
use multiplayer_transport::protocol::packets::Welcome;
use multiplayer_transport::transport::datagram::unwrap_datagram;

fuzz_target!(|data: &[u8]| {
    // Field reads past the end must fail cleanly, never panic
    let mut packet = Packet::from(data);
    let _ = Welcome::read(&mut packet);
    while packet.read_string().is_ok() || packet.read_u8().is_ok() {}

    let _ = unwrap_datagram(data);
});
