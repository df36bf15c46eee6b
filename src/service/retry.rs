//! Bounded connect sequence.
//!
//! A [`ConnectSequence`] counts attempts and tracks the window of the current
//! one. It does no I/O and never sleeps: the controller asks it whether to
//! start another attempt and whether the current one has run out of time, so
//! the sequence can be advanced from a frame tick without blocking.
//!
//! An attempt that fails before its window closes still holds the window: the
//! next attempt starts only once it has elapsed.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ConnectSequence {
    max_attempts: u32,
    attempt_timeout: Duration,
    attempts: u32,
    deadline: Option<Instant>,
    pending: bool,
}

impl ConnectSequence {
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            attempt_timeout,
            attempts: 0,
            deadline: None,
            pending: false,
        }
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Start the next attempt and return its 1-based number.
    /// Returns `None` once every attempt has been used.
    pub fn begin_attempt(&mut self, now: Instant) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.deadline = Some(now + self.attempt_timeout);
        self.pending = true;
        Some(self.attempts)
    }

    /// Mark the current attempt as resolved and release its window.
    pub fn end_attempt(&mut self) {
        self.deadline = None;
        self.pending = false;
    }

    /// Mark the current attempt as failed but keep its window, so the next
    /// attempt waits until the window has elapsed.
    pub fn fail_attempt(&mut self) {
        self.pending = false;
    }

    /// A connect is outstanding for the current attempt.
    pub fn in_flight(&self) -> bool {
        self.pending
    }

    /// A failed attempt's window is still open.
    pub fn cooling_down(&self, now: Instant) -> bool {
        !self.pending && self.deadline.is_some_and(|deadline| now < deadline)
    }

    /// Whether the attempt in flight has outlived its window.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// No attempt in flight and none left to start.
    pub fn is_exhausted(&self) -> bool {
        !self.pending && self.attempts >= self.max_attempts
    }
}
