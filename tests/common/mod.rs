//! Helpers shared by the client integration tests: a blocking std-socket
//! server side and a tick loop for the client.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use multiplayer_transport::config::NetworkConfig;
use multiplayer_transport::core::packet::Packet;
use multiplayer_transport::service::Client;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

pub fn config_for(port: u16) -> NetworkConfig {
    NetworkConfig::default_with_overrides(|c| {
        c.client.host = "127.0.0.1".to_string();
        c.client.port = port;
        c.client.username = "Knight".to_string();
        c.client.attempt_timeout = Duration::from_millis(500);
    })
}

/// A port nothing is listening on.
pub fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Tick `client` until `done` holds or `timeout` elapses.
pub fn tick_until(client: &mut Client, timeout: Duration, mut done: impl FnMut(&Client) -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        client.tick();
        if done(client) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Tick for a fixed duration.
pub fn tick_for(client: &mut Client, duration: Duration) {
    tick_until(client, duration, |_| false);
}

pub fn accept(listener: &TcpListener) -> TcpStream {
    let (socket, _) = listener.accept().unwrap();
    socket.set_read_timeout(Some(WAIT)).unwrap();
    socket
}

pub fn write_frame(socket: &mut TcpStream, mut packet: Packet) {
    packet.insert_length_prefix();
    socket.write_all(packet.as_bytes()).unwrap();
    socket.flush().unwrap();
}

/// Read one length-prefixed frame; `None` on a clean EOF.
pub fn read_frame(socket: &mut TcpStream) -> Option<Packet> {
    let mut header = [0u8; 4];
    match socket.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
        Err(e) => panic!("read failed: {e}"),
    }
    let len = i32::from_le_bytes(header) as usize;
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).unwrap();
    Some(Packet::from(body))
}

/// Every frame up to EOF.
pub fn read_to_close(socket: &mut TcpStream) -> Vec<Packet> {
    let mut frames = Vec::new();
    while let Some(frame) = read_frame(socket) {
        frames.push(frame);
    }
    frames
}
