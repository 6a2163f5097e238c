pub mod states;

use crate::core::client::{RealtimeClient, Shared};
use crate::core::config::{ClientConfig, TransportKind};
use crate::core::registry::SubscriberRegistry;
use crate::core::sse::SseTransport;
use crate::core::stomp::StompTransport;
use crate::traits::*;
use states::*;
use std::sync::Arc;

/// Type-state builder for RealtimeClient
///
/// A transport and a credential provider are required; everything else
/// falls back to the values in [`ClientConfig`].
///
/// ```rust,ignore
/// let client = RealtimeClientBuilder::new()
///     .config(config)
///     .transport_from_config()?
///     .credentials(EnvToken::new("NOTIFY_TOKEN"))
///     .build()?;
/// ```
pub struct RealtimeClientBuilder<T, C>
where
    T: TransportState,
    C: CredentialState,
{
    _state: TypeState<T, C>,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    classifier: Option<Arc<dyn FrameClassifier>>,
    strategy: Option<Arc<dyn ReconnectionStrategy>>,
    registry: Option<SubscriberRegistry>,
}

impl RealtimeClientBuilder<NoTransport, NoCredentials> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ClientConfig::default(),
            transport: None,
            credentials: None,
            classifier: None,
            strategy: None,
            registry: None,
        }
    }
}

impl Default for RealtimeClientBuilder<NoTransport, NoCredentials> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> RealtimeClientBuilder<T, C>
where
    T: TransportState,
    C: CredentialState,
{
    fn into_state<T2, C2>(self) -> RealtimeClientBuilder<T2, C2>
    where
        T2: TransportState,
        C2: CredentialState,
    {
        RealtimeClientBuilder {
            _state: TypeState::new(),
            config: self.config,
            transport: self.transport,
            credentials: self.credentials,
            classifier: self.classifier,
            strategy: self.strategy,
            registry: self.registry,
        }
    }

    /// Timers, backoff, markers and endpoints. Validated by `build()`.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the classifier built from the configured markers
    pub fn classifier<F>(mut self, classifier: F) -> Self
    where
        F: FrameClassifier,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Override the exponential backoff built from the configuration
    pub fn reconnect_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ReconnectionStrategy + 'static,
    {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Share an existing registry, e.g. so consumers can subscribe before
    /// the client exists
    pub fn registry(mut self, registry: SubscriberRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

// Transport setting
impl<C> RealtimeClientBuilder<NoTransport, C>
where
    C: CredentialState,
{
    pub fn transport<X>(mut self, transport: X) -> RealtimeClientBuilder<HasTransport, C>
    where
        X: Transport,
    {
        self.transport = Some(Arc::new(transport));
        self.into_state()
    }

    /// Use the SSE or STOMP transport selected by the configuration
    ///
    /// Set `config` first; the transport is built from it here.
    pub fn transport_from_config(mut self) -> Result<RealtimeClientBuilder<HasTransport, C>> {
        let transport: Arc<dyn Transport> = match self.config.transport {
            TransportKind::Sse => Arc::new(SseTransport::new(&self.config)?),
            TransportKind::Stomp => Arc::new(StompTransport::new(&self.config)),
        };
        self.transport = Some(transport);
        Ok(self.into_state())
    }
}

// Credential setting
impl<T> RealtimeClientBuilder<T, NoCredentials>
where
    T: TransportState,
{
    pub fn credentials<P>(mut self, provider: P) -> RealtimeClientBuilder<T, HasCredentials>
    where
        P: CredentialProvider + 'static,
    {
        self.credentials = Some(Arc::new(provider));
        self.into_state()
    }
}

impl RealtimeClientBuilder<HasTransport, HasCredentials> {
    /// Build the client. Nothing connects until `connect` is called.
    pub fn build(self) -> Result<RealtimeClient> {
        self.config.validate()?;

        let transport = self
            .transport
            .ok_or_else(|| NotifyError::Configuration("transport not set".to_string()))?;
        let credentials = self
            .credentials
            .ok_or_else(|| NotifyError::Configuration("credentials not set".to_string()))?;

        let classifier = self.classifier.unwrap_or_else(|| {
            Arc::new(NotificationClassifier::new(self.config.markers.clone()))
        });
        let strategy = self
            .strategy
            .unwrap_or_else(|| Arc::new(self.config.backoff()));

        Ok(RealtimeClient::from_shared(Shared::new(
            transport,
            credentials,
            classifier,
            strategy,
            self.registry.unwrap_or_default(),
            self.config.heartbeat_timeout(),
            self.config.connect_timeout(),
        )))
    }
}
