//! notify-tail: connect as one identity and log every realtime event
//!
//! ```text
//! NOTIFY_TOKEN=... cargo run --bin notify-tail -- 42 [--config config/notify.yaml] [--resync]
//! ```

use anyhow::{Context, Result};
use notification_client::bin_common::{
    init_tracing, load_config_from_env, parse_args, wait_for_shutdown, BinaryRunner, ConfigType,
    RunConfig, TailArgs, TOKEN_ENV,
};
use notify_stream::*;
use std::sync::Arc;
use tracing::{error, info, warn};

struct TailApp {
    run_config: RunConfig,
    identity: Identity,
    client: RealtimeClient,
    inbox: InboxConsumer,
    _logger: Subscription,
}

impl TailApp {
    fn new(args: TailArgs) -> Result<Self> {
        let config_type = args.config.map(ConfigType::Custom).unwrap_or(ConfigType::Client);
        let config_path = load_config_from_env(config_type);
        let config = ClientConfig::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;

        info!(
            "[Tail] {} transport against {} (max {} retries, {}ms base delay)",
            match config.transport {
                TransportKind::Sse => "SSE",
                TransportKind::Stomp => "STOMP",
            },
            config.base_url,
            config.max_attempts,
            config.base_delay_ms
        );

        let client = RealtimeClientBuilder::new()
            .config(config.clone())
            .transport_from_config()?
            .credentials(EnvToken::new(TOKEN_ENV))
            .build()?;

        let api: Option<Arc<dyn NotificationApi>> = if args.resync {
            let api = HttpNotificationApi::new(
                config.base_url.clone(),
                EnvToken::new(TOKEN_ENV),
                config.connect_timeout(),
            )?;
            Some(Arc::new(api))
        } else {
            None
        };

        let inbox = InboxConsumer::attach_to(&client, "tail", NotificationInbox::single(config.page_size), api);
        let logger = client.subscribe(log_event);

        Ok(Self {
            run_config: RunConfig::new("notify-tail").with_status_interval(60),
            identity: Identity::from(args.identity),
            client,
            inbox,
            _logger: logger,
        })
    }
}

impl BinaryRunner for TailApp {
    async fn run(&mut self) -> Result<()> {
        let connecting = self.client.connect(self.identity.clone());
        tokio::spawn(async move {
            match connecting.await {
                Ok(()) => info!("[Tail] Connected"),
                Err(e) => error!("[Tail] Connect failed: {}", e),
            }
        });

        let mut status = tokio::time::interval(self.run_config.status_interval());
        status.tick().await;

        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = status.tick() => {
                    let metrics = self.client.metrics();
                    info!(
                        "[Tail] {:?} | unread {} | frames {} ({} dropped) | reconnects {}",
                        metrics.connection_state,
                        self.inbox.unread_count(),
                        metrics.frames_received,
                        metrics.frames_dropped,
                        metrics.reconnect_count
                    );
                }
            }
        }

        self.client.disconnect();
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        let metrics = self.client.metrics();
        Some(format!(
            "{} notifications, {} unread, {} connections opened",
            metrics.notifications_published,
            self.inbox.unread_count(),
            metrics.connections_opened
        ))
    }
}

fn log_event(event: &ClassifiedEvent) -> notify_stream::Result<()> {
    match event {
        ClassifiedEvent::ConnectionEstablished { identity } => {
            info!("[Tail] Realtime open for {}", identity);
        }
        ClassifiedEvent::ConnectionClosed {
            identity,
            reason,
            retry_in,
        } => match retry_in {
            Some(delay) => warn!("[Tail] {} closed ({:?}), retrying in {:?}", identity, reason, delay),
            None => info!("[Tail] {} closed ({:?})", identity, reason),
        },
        ClassifiedEvent::AuthError { identity, message } => {
            error!("[Tail] Credential rejected for {}: {} (set {})", identity, message, TOKEN_ENV);
        }
        ClassifiedEvent::NotificationReceived(record) => {
            let json = serde_json::to_string(record).unwrap_or_else(|_| record.id.to_string());
            info!("[Tail] {:?} {}", record.priority, json);
        }
        ClassifiedEvent::FatalError { identity, error } => {
            error!("[Tail] Realtime gave up for {}: {}", identity, error);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = parse_args(std::env::args().skip(1)).map_err(anyhow::Error::msg)?;
    let mut app = TailApp::new(args)?;
    app.execute().await
}
