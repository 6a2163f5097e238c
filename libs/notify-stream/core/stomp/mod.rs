//! STOMP over WebSocket transport
//!
//! Connects the WebSocket, performs the STOMP CONNECT/CONNECTED handshake,
//! subscribes to each configured destination once and surfaces MESSAGE
//! bodies as raw frames keyed by destination.

pub mod frame;

use crate::core::config::ClientConfig;
use crate::traits::*;
use async_trait::async_trait;
use frame::{StompFrame, StompInbound};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const USER_QUEUE: &str = "/user/queue/notifications";
pub const BROADCAST_TOPIC: &str = "/topic/broadcasts";

/// STOMP 1.2 transport over tokio-tungstenite
pub struct StompTransport {
    url: String,
    heartbeat: Duration,
    destinations: Vec<String>,
    keepalive_event: String,
}

impl StompTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_url(config.ws_url(), config)
    }

    pub fn with_url(url: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            url: url.into(),
            heartbeat: config.stomp_heartbeat(),
            destinations: vec![USER_QUEUE.to_string(), BROADCAST_TOPIC.to_string()],
            keepalive_event: config.markers.keepalive_event.clone(),
        }
    }

    /// Replace the subscribed destinations; duplicates are subscribed once
    pub fn with_destinations<I, S>(mut self, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destinations.clear();
        for destination in destinations {
            let destination = destination.into();
            if !self.destinations.contains(&destination) {
                self.destinations.push(destination);
            }
        }
        self
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    fn connect_frame(&self, request: &OpenRequest) -> StompFrame {
        let beat = self.heartbeat.as_millis();
        StompFrame::new("CONNECT")
            .header("accept-version", "1.2,1.1,1.0")
            .header("heart-beat", format!("{},{}", beat, beat))
            .header("user-id", request.identity.as_str())
            .header("Authorization", request.credential.bearer())
    }

    /// Wait for CONNECTED, returning the outgoing heart-beat interval
    async fn await_connected(&self, ws: &mut WsStream) -> Result<Option<Duration>> {
        loop {
            let message = match ws.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => {
                    return Err(NotifyError::TransportOpenFailure(
                        "socket closed during STOMP handshake".to_string(),
                    ))
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Message::Close(_) => {
                    return Err(NotifyError::TransportOpenFailure(
                        "socket closed during STOMP handshake".to_string(),
                    ))
                }
                _ => continue,
            };

            for item in StompFrame::decode(&text)? {
                let StompInbound::Frame(frame) = item else {
                    continue;
                };
                match frame.command.as_str() {
                    "CONNECTED" => {
                        debug!(
                            "[STOMP] CONNECTED version={} heart-beat={}",
                            frame.get("version").unwrap_or("?"),
                            frame.get("heart-beat").unwrap_or("0,0")
                        );
                        return Ok(negotiate_heartbeat(self.heartbeat, frame.get("heart-beat")));
                    }
                    "ERROR" => return Err(error_frame(&frame)),
                    other => trace!("[STOMP] Ignoring {} before CONNECTED", other),
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StompTransport {
    fn name(&self) -> &'static str {
        "stomp"
    }

    async fn open(&self, request: &OpenRequest) -> Result<Box<dyn Connection>> {
        debug!("[STOMP] Connecting to {}", self.url);

        let (mut ws, _response) = connect_async(self.url.as_str()).await.map_err(map_ws_error)?;

        ws.send(Message::Text(self.connect_frame(request).encode()))
            .await
            .map_err(map_ws_error)?;

        let outgoing = self.await_connected(&mut ws).await?;

        for (index, destination) in self.destinations.iter().enumerate() {
            let subscribe = StompFrame::new("SUBSCRIBE")
                .header("id", format!("sub-{}", index))
                .header("destination", destination.as_str())
                .header("ack", "auto");
            ws.send(Message::Text(subscribe.encode()))
                .await
                .map_err(map_ws_error)?;
            debug!("[STOMP] Subscribed to {}", destination);
        }

        info!(
            "[STOMP] Session open for {} ({} subscriptions)",
            request.identity,
            self.destinations.len()
        );

        let heartbeat = outgoing.map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        Ok(Box::new(StompConnection {
            ws,
            heartbeat,
            keepalive_event: self.keepalive_event.clone(),
            pending: VecDeque::new(),
        }))
    }
}

/// One STOMP session on an open WebSocket
pub struct StompConnection {
    ws: WsStream,
    heartbeat: Option<Interval>,
    keepalive_event: String,
    pending: VecDeque<RawFrame>,
}

enum Step {
    Beat,
    Inbound(Option<std::result::Result<Message, WsError>>),
}

impl StompConnection {
    fn handle_text(&mut self, text: &str) -> Result<()> {
        for item in StompFrame::decode(text)? {
            match item {
                StompInbound::Heartbeat => {
                    self.pending
                        .push_back(RawFrame::new(self.keepalive_event.as_str(), ""));
                }
                StompInbound::Frame(frame) => match frame.command.as_str() {
                    "MESSAGE" => {
                        let destination = frame.get("destination").unwrap_or("message").to_string();
                        self.pending.push_back(RawFrame::new(destination, frame.body));
                    }
                    "ERROR" => return Err(error_frame(&frame)),
                    other => trace!("[STOMP] Ignoring {} frame", other),
                },
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for StompConnection {
    async fn next_frame(&mut self) -> Option<Result<RawFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }

            let step = match self.heartbeat.as_mut() {
                Some(interval) => tokio::select! {
                    _ = interval.tick() => Step::Beat,
                    message = self.ws.next() => Step::Inbound(message),
                },
                None => Step::Inbound(self.ws.next().await),
            };

            let message = match step {
                Step::Beat => {
                    trace!("[STOMP] Sending heart-beat");
                    if let Err(e) = self.ws.send(Message::Text("\n".to_string())).await {
                        return Some(Err(map_ws_error(e)));
                    }
                    continue;
                }
                Step::Inbound(None) => return None,
                Step::Inbound(Some(Err(e))) => return Some(Err(map_ws_error(e))),
                Step::Inbound(Some(Ok(message))) => message,
            };

            let result = match message {
                Message::Text(text) => self.handle_text(&text),
                Message::Binary(bytes) => self.handle_text(&String::from_utf8_lossy(&bytes)),
                Message::Close(frame) => {
                    debug!("[STOMP] Server closed the socket: {:?}", frame);
                    return None;
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                return Some(Err(e));
            }
        }
    }

    async fn close(&mut self) {
        let disconnect = StompFrame::new("DISCONNECT").encode();
        if let Err(e) = self.ws.send(Message::Text(disconnect)).await {
            trace!("[STOMP] DISCONNECT not sent: {}", e);
        }
        if let Err(e) = self.ws.close(None).await {
            trace!("[STOMP] Close handshake failed: {}", e);
        }
    }
}

/// Outgoing heart-beat period: max of what we offer and what the server
/// wants to receive, or none if either side disables it
fn negotiate_heartbeat(offered: Duration, server: Option<&str>) -> Option<Duration> {
    let wants_ms = server
        .and_then(|value| value.split(',').nth(1))
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let offered_ms = offered.as_millis() as u64;
    if offered_ms == 0 || wants_ms == 0 {
        return None;
    }
    Some(Duration::from_millis(offered_ms.max(wants_ms)))
}

fn error_frame(frame: &StompFrame) -> NotifyError {
    let message = frame
        .get("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.trim().to_string());
    let lowered = message.to_lowercase();
    let rejected = ["auth", "unauthor", "forbidden", "401", "403", "token", "credential"]
        .iter()
        .any(|needle| lowered.contains(needle));

    if rejected {
        NotifyError::AuthenticationFailure(format!("STOMP ERROR: {}", message))
    } else {
        warn!("[STOMP] ERROR frame: {}", message);
        NotifyError::ProtocolError(format!("STOMP ERROR: {}", message))
    }
}

fn map_ws_error(error: WsError) -> NotifyError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                NotifyError::AuthenticationFailure(format!("WebSocket handshake returned {}", status))
            } else {
                NotifyError::TransportOpenFailure(format!("WebSocket handshake returned {}", status))
            }
        }
        WsError::Url(e) => NotifyError::Configuration(format!("invalid WebSocket URL: {}", e)),
        WsError::Io(e) => NotifyError::TransportOpenFailure(e.to_string()),
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            NotifyError::ProtocolError("WebSocket closed".to_string())
        }
        other => NotifyError::ProtocolError(other.to_string()),
    }
}
