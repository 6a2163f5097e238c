use thiserror::Error;

/// Main error type for notify-stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The transport could not be opened (DNS, TCP, TLS, HTTP status)
    #[error("Transport open failure: {0}")]
    TransportOpenFailure(String),

    /// Malformed handshake or protocol violation on an open transport
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Missing or rejected credential (terminal, never retried)
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// A single inbound frame could not be parsed (non-fatal)
    #[error("Frame parse error: {0}")]
    FrameParseError(String),

    /// Retry budget exhausted
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    MaxRetriesExceeded { attempts: u32, reason: String },

    /// The connect request was superseded by `disconnect` or an identity switch
    #[error("Connection request cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// CRUD collaborator request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl NotifyError {
    /// Whether the controller may retry after this error.
    ///
    /// Authentication failures and cancellations are terminal; every
    /// transport or protocol level failure shares the retry path.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::TransportOpenFailure(_)
            | NotifyError::ProtocolError(_)
            | NotifyError::Timeout(_) => true,
            NotifyError::AuthenticationFailure(_)
            | NotifyError::FrameParseError(_)
            | NotifyError::MaxRetriesExceeded { .. }
            | NotifyError::Cancelled(_)
            | NotifyError::Configuration(_)
            | NotifyError::Http(_)
            | NotifyError::ChannelSend(_) => false,
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Http(e.to_string())
    }
}

/// Result type for notify-stream operations
pub type Result<T> = std::result::Result<T, NotifyError>;
