//! Connection controller lifecycle against a real loopback server
//!
//! The server side uses blocking std sockets; the client is driven the way a
//! game loop drives it, by calling `tick` repeatedly from the test thread.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::*;
use multiplayer_transport::core::packet::Packet;
use multiplayer_transport::protocol::packets::{ClientPacket, ServerPacket, Welcome};
use multiplayer_transport::service::{Client, ConnectionState};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn welcome(session_id: u8) -> Packet {
    Welcome {
        message: "Welcome to the server!".to_string(),
        session_id,
    }
    .to_packet()
}

fn connected_client(listener: &TcpListener) -> Client {
    let port = listener.local_addr().unwrap().port();
    let mut client = Client::new(config_for(port)).unwrap();
    client.connect_to_server();
    assert!(tick_until(&mut client, WAIT, |c| c.state() == ConnectionState::Connected));
    client
}

#[test]
fn test_gives_up_after_five_failed_attempts() {
    let mut client = Client::new(config_for(refused_port())).unwrap();
    let status = client.subscribe();

    let started = Instant::now();
    client.connect_to_server();
    assert_eq!(client.state(), ConnectionState::Connecting);

    assert!(tick_until(&mut client, WAIT, |c| c.status().gave_up));

    // A refused attempt still waits out its window before the next one.
    let attempt_timeout = client.config().client.attempt_timeout;
    assert!(
        started.elapsed() >= attempt_timeout * 4,
        "gave up after {:?}",
        started.elapsed()
    );

    let final_status = client.status();
    assert_eq!(final_status.state, ConnectionState::Disconnected);
    assert_eq!(final_status.attempt, 5);
    assert_eq!(final_status.describe(), "Could not connect to server.");
    assert_eq!(*status.borrow(), final_status);

    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.connect_attempts, 5);
    assert_eq!(metrics.connect_failures, 5);
    assert_eq!(metrics.connections_established, 0);

    // Nothing further happens once the sequence has given up.
    tick_for(&mut client, Duration::from_millis(50));
    assert_eq!(client.metrics().snapshot().connect_attempts, 5);
}

#[test]
fn test_connect_while_connected_is_noop() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let _server = accept(&listener);

    assert_eq!(client.status().attempt, 1);
    assert_eq!(client.status().describe(), "Connected to server.");

    client.connect_to_server();
    tick_for(&mut client, Duration::from_millis(50));

    assert_eq!(client.state(), ConnectionState::Connected);
    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.connect_attempts, 1);
    assert_eq!(metrics.connections_established, 1);
}

#[test]
fn test_connect_while_connecting_is_noop() {
    let mut client = Client::new(config_for(refused_port())).unwrap();
    client.connect_to_server();
    client.connect_to_server();
    assert_eq!(client.metrics().snapshot().connect_attempts, 1);
    client.disconnect();
}

#[test]
fn test_disconnect_while_connecting_stops_retries() {
    let mut client = Client::new(config_for(refused_port())).unwrap();
    client.connect_to_server();
    assert_eq!(client.status().attempt, 1);

    client.disconnect();
    let window = client.config().client.attempt_timeout;
    tick_for(&mut client, window * 3);

    let status = client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.gave_up);
    assert_eq!(client.metrics().snapshot().connect_attempts, 1);
}

#[test]
fn test_welcome_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let mut server = accept(&listener);

    write_frame(&mut server, welcome(3));
    assert!(tick_until(&mut client, WAIT, |c| c.session_id() == Some(3)));

    let mut ack = read_frame(&mut server).expect("welcome acknowledgement");
    assert_eq!(ack.read_i32().unwrap(), ClientPacket::WelcomeReceived.id());
    assert_eq!(ack.read_i32().unwrap(), 3);
    assert_eq!(ack.read_string().unwrap(), "Knight");
}

#[test]
fn test_double_disconnect_sends_one_notification() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let mut server = accept(&listener);

    let resets = Arc::new(AtomicUsize::new(0));
    let counter = resets.clone();
    client.on_session_reset(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    write_frame(&mut server, welcome(4));
    assert!(tick_until(&mut client, WAIT, |c| c.session_id() == Some(4)));
    read_frame(&mut server).expect("welcome acknowledgement");

    client.disconnect();
    client.disconnect();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.session_id(), None);
    assert_eq!(client.status().describe(), "Disconnected.");
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    assert_eq!(client.metrics().snapshot().disconnects, 1);

    let frames = read_to_close(&mut server);
    assert_eq!(frames.len(), 1, "exactly one leave notification");
    let mut leave = frames.into_iter().next().unwrap();
    assert_eq!(leave.read_i32().unwrap(), ClientPacket::PlayerDisconnected.id());
    assert_eq!(leave.read_i32().unwrap(), 4);
}

#[test]
fn test_server_close_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let server = accept(&listener);

    let resets = Arc::new(AtomicUsize::new(0));
    let counter = resets.clone();
    client.on_session_reset(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    drop(server);
    assert!(tick_until(&mut client, WAIT, |c| c.state() == ConnectionState::Disconnected));
    assert!(!client.status().gave_up);
    assert_eq!(resets.load(Ordering::SeqCst), 1);
}

#[test]
fn test_kick_tears_down_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let mut server = accept(&listener);

    write_frame(&mut server, welcome(6));
    assert!(tick_until(&mut client, WAIT, |c| c.session_id() == Some(6)));
    read_frame(&mut server).expect("welcome acknowledgement");

    write_frame(&mut server, Packet::with_id(ServerPacket::DisconnectPlayer.id()));
    assert!(tick_until(&mut client, WAIT, |c| c.state() == ConnectionState::Disconnected));

    let frames = read_to_close(&mut server);
    assert_eq!(frames.len(), 1);
    let mut leave = frames.into_iter().next().unwrap();
    assert_eq!(leave.read_i32().unwrap(), ClientPacket::PlayerDisconnected.id());
    assert_eq!(leave.read_i32().unwrap(), 6);
}

#[test]
fn test_handlers_run_on_tick_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut client = Client::new(config_for(port)).unwrap();
    let sink = seen.clone();
    client
        .register(ServerPacket::HealthUpdated.id(), move |packet| {
            sink.lock().unwrap().push(packet.read_i32()?);
            Ok(())
        })
        .unwrap();

    client.connect_to_server();
    assert!(tick_until(&mut client, WAIT, |c| c.state() == ConnectionState::Connected));
    let mut server = accept(&listener);

    // Several frames in one write, plus one unknown id in between.
    let mut burst = Vec::new();
    for (id, value) in [(10, 1), (99, 0), (10, 2), (10, 3)] {
        let mut packet = Packet::with_id(id);
        packet.write_i32(value);
        packet.insert_length_prefix();
        burst.extend_from_slice(packet.as_bytes());
    }
    std::io::Write::write_all(&mut server, &burst).unwrap();

    assert!(tick_until(&mut client, WAIT, |_| seen.lock().unwrap().len() == 3));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(client.metrics().snapshot().unknown_packets, 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test]
fn test_send_reliable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let mut server = accept(&listener);

    let mut packet = ClientPacket::SceneChanged.packet();
    packet.write_string("Town");
    client.send_reliable(packet);

    let mut frame = read_frame(&mut server).unwrap();
    assert_eq!(frame.read_i32().unwrap(), ClientPacket::SceneChanged.id());
    assert_eq!(frame.read_string().unwrap(), "Town");
}

#[test]
fn test_reconnect_after_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut client = connected_client(&listener);
    let first = accept(&listener);

    client.disconnect();
    drop(first);
    // A stale link-lost event from the first session must not tear down the second.
    tick_for(&mut client, Duration::from_millis(50));

    client.connect_to_server();
    assert!(tick_until(&mut client, WAIT, |c| c.state() == ConnectionState::Connected));
    let _second = accept(&listener);

    tick_for(&mut client, Duration::from_millis(100));
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.metrics().snapshot().connections_established, 2);
}

#[test]
fn test_status_subscribers_see_transitions() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = Client::new(config_for(port)).unwrap();
    let mut status = client.subscribe();

    client.connect_to_server();
    assert!(status.has_changed().unwrap());
    assert_eq!(status.borrow_and_update().state, ConnectionState::Connecting);

    assert!(tick_until(&mut client, WAIT, |c| c.state() == ConnectionState::Connected));
    assert_eq!(status.borrow_and_update().state, ConnectionState::Connected);

    client.disconnect();
    assert_eq!(status.borrow_and_update().state, ConnectionState::Disconnected);
}
