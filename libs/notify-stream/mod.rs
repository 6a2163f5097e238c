//! # Notify-Stream
//!
//! Realtime notification delivery client: keeps one long-lived push channel
//! (Server-Sent Events or STOMP over WebSocket) open per identity, survives
//! network interruption, and fans classified events out to any number of
//! independent consumers.
//!
//! ## Features
//!
//! - **Single retry authority**: the controller owns reconnection; transports never retry
//! - **At most one connection per identity**: generation-checked session slot
//! - **Snapshot fan-out**: subscribers may unsubscribe mid-publish, failures are isolated
//! - **Replay-safe consumers**: id-based dedup, bounded feeds, global unread counter
//! - **Type-state builder**: compile-time guarantees for required collaborators

pub mod consumer;
pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder,
    builder::{states, RealtimeClientBuilder},
    client,
    client::RealtimeClient,
    config,
    config::{ClientConfig, TransportKind},
    connection_state,
    connection_state::{AtomicConnectionState, ConnectionState, Metrics, ReconnectState},
    registry,
    registry::{EventCallback, SubscriberRegistry, Subscription},
    sse::SseTransport,
    stomp::StompTransport,
};

// Re-export consumer side
pub use consumer::{
    HttpNotificationApi, InboxConsumer, ListKind, NotificationApi, NotificationFeed, NotificationFilter,
    NotificationInbox, NotificationPage, PageQuery, Reconciled,
};

// Convenience function
pub use self::core::builder as client_builder;
