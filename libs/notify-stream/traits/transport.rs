use crate::auth::Credential;
use crate::error::Result;
use crate::frame::{Identity, RawFrame};
use async_trait::async_trait;

/// Everything a transport needs to open one physical connection
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub identity: Identity,
    pub credential: Credential,
}

/// Factory for physical connections
///
/// A transport must never reconnect on its own: the controller is the only
/// retry authority, and a transport that silently re-opens would break the
/// one-connection-per-identity invariant.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short name for logging ("sse", "stomp", ...)
    fn name(&self) -> &'static str;

    /// Open a connection and complete any protocol handshake
    ///
    /// # Errors
    /// * `AuthenticationFailure` - the credential was rejected (terminal)
    /// * `TransportOpenFailure` / `ProtocolError` / `Timeout` - retried
    async fn open(&self, request: &OpenRequest) -> Result<Box<dyn Connection>>;
}

/// One open physical connection
///
/// Dropping a connection must release the underlying socket.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound frame, in transport order
    ///
    /// # Returns
    /// * `Some(Ok(frame))` - a frame, keep-alives included
    /// * `Some(Err(e))` - the connection failed and is unusable
    /// * `None` - the peer closed the connection
    async fn next_frame(&mut self) -> Option<Result<RawFrame>>;

    /// Close the connection gracefully
    async fn close(&mut self);
}
