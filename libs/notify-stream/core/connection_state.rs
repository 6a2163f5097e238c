//! Lock-free connection state and metrics
//!
//! Writes happen only on the controller's side (under its session lock);
//! reads are lock-free from any thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Authoritative lifecycle state of the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Nothing requested yet
    Idle = 0,
    /// A transport open is in flight
    Connecting = 1,
    /// Frames are flowing
    Open = 2,
    /// Being torn down on purpose
    Closing = 3,
    /// Closed unexpectedly, a retry timer is pending
    ClosedRetrying = 4,
    /// Closed for good until a fresh `connect`
    ClosedTerminal = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Closing,
            4 => ConnectionState::ClosedRetrying,
            _ => ConnectionState::ClosedTerminal,
        }
    }

    /// A connection exists or is being established
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// A session is alive: active, or waiting on its retry timer
    #[inline]
    pub fn is_live(&self) -> bool {
        self.is_active() || *self == ConnectionState::ClosedRetrying
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        *self == ConnectionState::ClosedTerminal
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::ClosedRetrying => "CLOSED_RETRYING",
            ConnectionState::ClosedTerminal => "CLOSED_TERMINAL",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Swap in `state`, returning the previous value
    #[inline]
    pub fn replace(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.inner.swap(state as u8, Ordering::AcqRel))
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.get().is_terminal()
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Idle)
    }
}

/// Retry bookkeeping, reset on every successful open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempt_count: u32,
    pub next_delay: Option<Duration>,
    pub max_attempts: u32,
}

impl ReconnectState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            next_delay: None,
            max_attempts,
        }
    }

    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.next_delay = None;
    }

    pub fn exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// Client metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub notifications_published: u64,
    pub connections_opened: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

/// Lock-free counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    notifications_published: AtomicU64,
    connections_opened: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_published(&self) {
        self.notifications_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, connection_state: ConnectionState) -> Metrics {
        Metrics {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            notifications_published: self.notifications_published.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnect_count: self.reconnect_count.load(Ordering::Relaxed),
            connection_state,
        }
    }
}
