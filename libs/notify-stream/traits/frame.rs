use std::fmt;

/// Opaque principal a realtime channel is scoped to (usually a user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One discrete message unit received from a transport
///
/// `event` is the SSE event name or the STOMP destination the frame
/// arrived on; `data` is the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// A frame with the default SSE event name
    pub fn message(data: impl Into<String>) -> Self {
        Self::new("message", data)
    }

    /// Check if the payload carries nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.data.trim().is_empty()
    }
}
