//! Observability and Metrics
//!
//! Per-client counters for connection attempts, traffic and dropped input.
//!
//! Uses atomic counters so I/O tasks and the consumer thread can record
//! without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector shared by a client and its transports
#[derive(Debug)]
pub struct Metrics {
    /// Connect attempts started
    pub connect_attempts: AtomicU64,
    /// Connect attempts that failed or timed out
    pub connect_failures: AtomicU64,
    /// Stream connections that reached the open state
    pub connections_established: AtomicU64,
    /// Completed teardowns
    pub disconnects: AtomicU64,
    /// Frames handed to the dispatch queue
    pub frames_received: AtomicU64,
    /// Payload bytes of received frames
    pub bytes_received: AtomicU64,
    /// Packets accepted for sending
    pub packets_sent: AtomicU64,
    /// Bytes accepted for sending
    pub bytes_sent: AtomicU64,
    /// Sends that failed and were dropped
    pub send_failures: AtomicU64,
    /// Frames or datagrams rejected by framing
    pub malformed_frames: AtomicU64,
    /// Packets with no registered handler
    pub unknown_packets: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            unknown_packets: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame handed to the dispatch queue
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a packet accepted by a transport
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_packet(&self) {
        self.unknown_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            unknown_packets: self.unknown_packets.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connect_attempts = snapshot.connect_attempts,
            connect_failures = snapshot.connect_failures,
            connections_established = snapshot.connections_established,
            disconnects = snapshot.disconnects,
            frames_received = snapshot.frames_received,
            bytes_received = snapshot.bytes_received,
            packets_sent = snapshot.packets_sent,
            bytes_sent = snapshot.bytes_sent,
            send_failures = snapshot.send_failures,
            malformed_frames = snapshot.malformed_frames,
            unknown_packets = snapshot.unknown_packets,
            uptime_seconds = snapshot.uptime_seconds,
            "Client transport metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub connections_established: u64,
    pub disconnects: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub malformed_frames: u64,
    pub unknown_packets: u64,
    pub uptime_seconds: u64,
}
