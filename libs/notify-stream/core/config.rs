use crate::traits::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which push channel to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Server-Sent Events over HTTP
    #[default]
    Sse,
    /// STOMP 1.2 over WebSocket
    Stomp,
}

/// Configuration for the realtime client
///
/// Every timer is configuration so tests can shrink it; nothing in the
/// controller is hardwired. Loaded from YAML or built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (http:// or https://)
    pub base_url: String,

    pub transport: TransportKind,

    /// SSE endpoint path, appended to `base_url`
    pub sse_path: String,

    /// WebSocket endpoint path, appended to `base_url` with a ws scheme
    pub ws_path: String,

    /// Retries allowed after an unexpected close before giving up
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Upper bound for any retry delay
    pub delay_ceiling_ms: u64,

    /// Silence longer than this is treated as a closed connection
    pub heartbeat_timeout_ms: u64,

    /// How often the producer sends keep-alives
    pub keepalive_interval_ms: u64,

    /// Bound on a single transport open, handshake included
    pub connect_timeout_ms: u64,

    /// Heart-beat interval negotiated in the STOMP CONNECT frame
    pub stomp_heartbeat_ms: u64,

    /// Capacity of each consumer's local list
    pub page_size: usize,

    pub markers: ClassifierMarkers,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            transport: TransportKind::Sse,
            sse_path: "/api/notifications/events".to_string(),
            ws_path: "/ws/websocket".to_string(),
            max_attempts: 5,
            base_delay_ms: 1_000,
            delay_ceiling_ms: 30_000,
            heartbeat_timeout_ms: 45_000,
            keepalive_interval_ms: 20_000,
            connect_timeout_ms: 10_000,
            stomp_heartbeat_ms: 4_000,
            page_size: 10,
            markers: ClassifierMarkers::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            NotifyError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)
            .map_err(|e| NotifyError::Configuration(format!("failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(NotifyError::Configuration(msg));

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return invalid(format!("base_url must be http(s): {}", self.base_url));
        }
        if self.base_delay_ms == 0 {
            return invalid("base_delay_ms must be > 0".to_string());
        }
        if self.delay_ceiling_ms < self.base_delay_ms {
            return invalid("delay_ceiling_ms must be >= base_delay_ms".to_string());
        }
        if self.heartbeat_timeout_ms < self.keepalive_interval_ms.saturating_mul(2) {
            return invalid(format!(
                "heartbeat_timeout_ms ({}) must be at least twice keepalive_interval_ms ({})",
                self.heartbeat_timeout_ms, self.keepalive_interval_ms
            ));
        }
        if self.transport == TransportKind::Stomp
            && self.stomp_heartbeat_ms > 0
            && self.heartbeat_timeout_ms < self.stomp_heartbeat_ms.saturating_mul(2)
        {
            return invalid("heartbeat_timeout_ms must be at least twice stomp_heartbeat_ms".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return invalid("connect_timeout_ms must be > 0".to_string());
        }
        if self.page_size == 0 {
            return invalid("page_size must be > 0".to_string());
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stomp_heartbeat(&self) -> Duration {
        Duration::from_millis(self.stomp_heartbeat_ms)
    }

    /// Backoff policy described by this configuration
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.delay_ceiling_ms),
            self.max_attempts,
        )
    }

    pub fn sse_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.sse_path)
    }

    /// WebSocket URL derived from `base_url` (http → ws, https → wss)
    pub fn ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", base, self.ws_path)
    }
}
