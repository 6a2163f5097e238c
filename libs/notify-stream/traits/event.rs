use crate::error::NotifyError;
use crate::frame::Identity;
use crate::record::NotificationRecord;
use std::fmt;
use std::time::Duration;

/// Why a physical connection went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The transport never opened
    TransportOpenFailure(String),
    /// The handshake or an open stream violated the protocol
    ProtocolError(String),
    /// The peer closed the stream
    StreamEnded,
    /// No frame (keep-alives included) arrived within the liveness window
    LivenessTimeout(Duration),
    /// `disconnect()` was called
    Requested,
    /// `connect()` was called for a different identity
    IdentityChanged,
}

impl DisconnectReason {
    pub(crate) fn from_error(err: &NotifyError) -> Self {
        match err {
            NotifyError::TransportOpenFailure(msg) | NotifyError::Timeout(msg) => {
                DisconnectReason::TransportOpenFailure(msg.clone())
            }
            other => DisconnectReason::ProtocolError(other.to_string()),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::TransportOpenFailure(msg) => write!(f, "transport open failure: {}", msg),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::StreamEnded => write!(f, "stream ended"),
            DisconnectReason::LivenessTimeout(d) => write!(f, "no frame within {:?}", d),
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::IdentityChanged => write!(f, "identity changed"),
        }
    }
}

/// Event fanned out to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    /// The transport opened; the retry budget has been reset
    ConnectionEstablished { identity: Identity },
    /// The transport closed. `retry_in` is set when a retry is scheduled.
    ConnectionClosed {
        identity: Identity,
        reason: DisconnectReason,
        retry_in: Option<Duration>,
    },
    /// The credential was missing or rejected; no retry will happen
    AuthError { identity: Identity, message: String },
    /// An application payload
    NotificationReceived(NotificationRecord),
    /// Realtime delivery gave up; only a fresh `connect` restarts it
    FatalError { identity: Identity, error: NotifyError },
}

impl ClassifiedEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedEvent::ConnectionEstablished { .. } => "ConnectionEstablished",
            ClassifiedEvent::ConnectionClosed { .. } => "ConnectionClosed",
            ClassifiedEvent::AuthError { .. } => "AuthError",
            ClassifiedEvent::NotificationReceived(_) => "NotificationReceived",
            ClassifiedEvent::FatalError { .. } => "FatalError",
        }
    }

    pub fn as_notification(&self) -> Option<&NotificationRecord> {
        match self {
            ClassifiedEvent::NotificationReceived(record) => Some(record),
            _ => None,
        }
    }

    /// Terminal events mean realtime updates are unavailable until a fresh connect
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClassifiedEvent::AuthError { .. } | ClassifiedEvent::FatalError { .. }
        )
    }
}
