//! # Notify-Stream Traits
//!
//! Core traits and types for the realtime notification client:
//!
//! - **Transport / Connection**: open a push channel and read raw frames
//! - **CredentialProvider**: supply the bearer token for each attempt
//! - **ReconnectionStrategy**: pure attempt-to-delay policy
//! - **FrameClassifier**: turn raw frames into classified events
//!
//! plus the data model shared by every layer (`Identity`, `RawFrame`,
//! `NotificationRecord`, `ClassifiedEvent`).
//!
//! ## Example
//!
//! ```rust,ignore
//! use notify_stream::traits::*;
//!
//! struct LoopbackTransport;
//!
//! #[async_trait]
//! impl Transport for LoopbackTransport {
//!     fn name(&self) -> &'static str { "loopback" }
//!
//!     async fn open(&self, request: &OpenRequest) -> Result<Box<dyn Connection>> {
//!         // Your connection logic here
//!     }
//! }
//! ```

pub mod auth;
pub mod classifier;
pub mod error;
pub mod event;
pub mod frame;
pub mod record;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use auth::{Credential, CredentialProvider, EnvToken, NoCredential, StaticToken};
pub use classifier::{Classification, ClassifierMarkers, FrameClassifier, NotificationClassifier};
pub use error::{NotifyError, Result};
pub use event::{ClassifiedEvent, DisconnectReason};
pub use frame::{Identity, RawFrame};
pub use record::{NotificationId, NotificationRecord, Priority, ReadStatus, TargetScope};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{Connection, OpenRequest, Transport};
