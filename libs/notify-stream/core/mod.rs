//! # Realtime client core
//!
//! The reconnection controller and everything it drives:
//!
//! - **RealtimeClient**: single retry authority, one session per identity
//! - **SubscriberRegistry**: snapshot-then-iterate fan-out with per-callback isolation
//! - **SseTransport / StompTransport**: the two push channels the backend offers
//! - **ClientConfig**: every timer and endpoint, loadable from YAML
//!
//! ## Example
//!
//! ```rust,ignore
//! use notify_stream::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::load("config/notify.yaml")?;
//!     let client = RealtimeClientBuilder::new()
//!         .config(config)
//!         .transport_from_config()?
//!         .credentials(EnvToken::new("NOTIFY_TOKEN"))
//!         .build()?;
//!
//!     let _sub = client.subscribe(|event| {
//!         println!("Event: {:?}", event);
//!         Ok(())
//!     });
//!
//!     client.connect("42").await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod registry;
pub mod sse;
pub mod stomp;

// Re-export main types
pub use builder::{states, RealtimeClientBuilder};
pub use client::RealtimeClient;
pub use config::{ClientConfig, TransportKind};
pub use connection_state::{
    AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics, ReconnectState,
};
pub use registry::{EventCallback, SubscriberRegistry, Subscription};
pub use sse::{SseConnection, SseParser, SseTransport};
pub use stomp::{StompConnection, StompTransport};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new realtime client builder
///
/// # Example
/// ```ignore
/// let client = notify_stream::builder()
///     .transport(SseTransport::new(&config)?)
///     .credentials(StaticToken::new(token))
///     .config(config)
///     .build()?;
/// ```
pub fn builder() -> RealtimeClientBuilder<states::NoTransport, states::NoCredentials> {
    RealtimeClientBuilder::new()
}
