//! Common test utilities for notify-stream integration tests
//!
//! - `MockTransport`: scripted in-memory transport that records every open
//!   and tracks how many connections exist at once
//! - `MockSseServer` / `MockStompServer`: minimal local backends
//! - `recv_event` helpers that poll a channel subscriber without blocking
//!   the runtime (so they also work with a paused clock)

#![allow(dead_code)]

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use futures::{SinkExt, StreamExt};
use notify_stream::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Timers shrunk for tests; backoff matches the product defaults
pub fn test_config() -> ClientConfig {
    ClientConfig {
        max_attempts: 5,
        base_delay_ms: 1_000,
        delay_ceiling_ms: 30_000,
        heartbeat_timeout_ms: 2_000,
        keepalive_interval_ms: 1_000,
        connect_timeout_ms: 5_000,
        stomp_heartbeat_ms: 0,
        ..ClientConfig::default()
    }
}

// ============================================================================
// Scripted transport
// ============================================================================

/// What the next `open` does
pub enum Script {
    Fail(NotifyError),
    Open(Vec<Step>),
}

/// What the next `next_frame` does on a scripted connection
pub enum Step {
    Frame(RawFrame),
    Wait(Duration),
    Close,
    Error(NotifyError),
}

pub fn frame(event: &str, data: &str) -> Step {
    Step::Frame(RawFrame::new(event, data))
}

pub fn notification(id: &str) -> Step {
    Step::Frame(RawFrame::message(format!(
        r#"{{"id":"{}","content":"notification {}","readStatus":"UNREAD"}}"#,
        id, id
    )))
}

#[derive(Default)]
struct MockInner {
    scripts: Mutex<VecDeque<Script>>,
    fail_when_empty: bool,
    open_delay: Duration,
    opens: Mutex<Vec<(Identity, Instant)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    closed: AtomicUsize,
}

/// Counts a connection (or an in-flight open) for as long as it lives
struct ActiveGuard(Arc<MockInner>);

impl ActiveGuard {
    fn new(inner: Arc<MockInner>) -> Self {
        let now = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_active.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted transport. Clones share state, so keep one for assertions and
/// hand the other to the builder.
///
/// With no script left, `open` yields an idle connection (or fails, for
/// [`MockTransport::failing`]).
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unscripted open fails with a transport error
    pub fn failing() -> Self {
        Self {
            inner: Arc::new(MockInner {
                fail_when_empty: true,
                ..MockInner::default()
            }),
        }
    }

    /// Opens take this long before resolving
    pub fn with_open_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(MockInner {
                open_delay: delay,
                ..MockInner::default()
            }),
        }
    }

    pub fn push(&self, script: Script) -> &Self {
        self.inner.scripts.lock().push_back(script);
        self
    }

    pub fn open_count(&self) -> usize {
        self.inner.opens.lock().len()
    }

    pub fn opened_identities(&self) -> Vec<String> {
        self.inner
            .opens
            .lock()
            .iter()
            .map(|(identity, _)| identity.to_string())
            .collect()
    }

    /// Gaps between consecutive opens
    pub fn open_gaps(&self) -> Vec<Duration> {
        let opens = self.inner.opens.lock();
        opens.windows(2).map(|w| w[1].1 - w[0].1).collect()
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open(&self, request: &OpenRequest) -> Result<Box<dyn Connection>> {
        let guard = ActiveGuard::new(Arc::clone(&self.inner));
        self.inner
            .opens
            .lock()
            .push((request.identity.clone(), Instant::now()));

        if !self.inner.open_delay.is_zero() {
            tokio::time::sleep(self.inner.open_delay).await;
        }

        let script = self.inner.scripts.lock().pop_front();
        match script {
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Open(steps)) => Ok(Box::new(MockConnection {
                steps: steps.into(),
                inner: Arc::clone(&self.inner),
                _guard: guard,
            })),
            None if self.inner.fail_when_empty => Err(NotifyError::TransportOpenFailure(
                "connection refused".to_string(),
            )),
            None => Ok(Box::new(MockConnection {
                steps: VecDeque::new(),
                inner: Arc::clone(&self.inner),
                _guard: guard,
            })),
        }
    }
}

/// Plays its steps, then stays open and silent
struct MockConnection {
    steps: VecDeque<Step>,
    inner: Arc<MockInner>,
    _guard: ActiveGuard,
}

#[async_trait]
impl Connection for MockConnection {
    async fn next_frame(&mut self) -> Option<Result<RawFrame>> {
        loop {
            match self.steps.pop_front() {
                Some(Step::Frame(frame)) => return Some(Ok(frame)),
                Some(Step::Wait(delay)) => tokio::time::sleep(delay).await,
                Some(Step::Close) => return None,
                Some(Step::Error(e)) => return Some(Err(e)),
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Gaps between opens match `expected_ms`, allowing for timer granularity
pub fn assert_gaps(transport: &MockTransport, expected_ms: &[u64]) {
    let gaps = transport.open_gaps();
    assert_eq!(gaps.len(), expected_ms.len(), "gaps: {:?}", gaps);
    for (gap, expected) in gaps.iter().zip(expected_ms) {
        let expected = Duration::from_millis(*expected);
        assert!(
            *gap >= expected && *gap < expected + Duration::from_millis(5),
            "expected {:?}, got {:?} (all gaps: {:?})",
            expected,
            gap,
            gaps
        );
    }
}

pub fn mock_client(transport: &MockTransport, config: ClientConfig) -> RealtimeClient {
    RealtimeClientBuilder::new()
        .config(config)
        .transport(transport.clone())
        .credentials(StaticToken::new("test-token"))
        .build()
        .unwrap()
}

// ============================================================================
// Event helpers
// ============================================================================

/// Poll a channel subscriber until an event arrives or `timeout` elapses
pub async fn recv_event(rx: &Receiver<ClassifiedEvent>, timeout: Duration) -> Option<ClassifiedEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(event) = rx.try_recv() {
            return Some(event);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Skip lifecycle events until a notification arrives
pub async fn recv_notification(
    rx: &Receiver<ClassifiedEvent>,
    timeout: Duration,
) -> Option<NotificationRecord> {
    let deadline = Instant::now() + timeout;
    while let Some(event) = recv_event(rx, deadline.saturating_duration_since(Instant::now())).await {
        if let ClassifiedEvent::NotificationReceived(record) = event {
            return Some(record);
        }
    }
    None
}

pub fn drain(rx: &Receiver<ClassifiedEvent>) -> Vec<ClassifiedEvent> {
    rx.try_iter().collect()
}

pub fn kinds(events: &[ClassifiedEvent]) -> Vec<&'static str> {
    events.iter().map(ClassifiedEvent::kind).collect()
}

// ============================================================================
// Mock SSE backend
// ============================================================================

/// Raw HTTP/1.1 server speaking just enough SSE for the client
pub struct MockSseServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<Notify>,
}

#[derive(Clone)]
pub enum SseReply {
    /// 200 text/event-stream, then these raw chunks, then hold the socket
    Stream(Vec<String>),
    /// Bare status line with an empty body
    Status(u16, &'static str),
}

impl MockSseServer {
    pub async fn start(reply: SseReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(Notify::new());

        let requests_in = Arc::clone(&requests);
        let shutdown_in = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let reply = reply.clone();
                        let requests = Arc::clone(&requests_in);
                        let shutdown = Arc::clone(&shutdown_in);
                        tokio::spawn(async move {
                            Self::handle(stream, reply, requests, shutdown).await;
                        });
                    }
                    _ = shutdown_in.notified() => break,
                }
            }
        });

        Self {
            addr,
            requests,
            shutdown,
        }
    }

    async fn handle(
        mut stream: TcpStream,
        reply: SseReply,
        requests: Arc<Mutex<Vec<String>>>,
        shutdown: Arc<Notify>,
    ) {
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        requests.lock().push(String::from_utf8_lossy(&head).into_owned());

        match reply {
            SseReply::Status(code, reason) => {
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    code, reason
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
            SseReply::Stream(chunks) => {
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                    Cache-Control: no-cache\r\nConnection: close\r\n\r\n";
                if stream.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in chunks {
                    if stream.write_all(chunk.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = stream.flush().await;
                }
                shutdown.notified().await;
            }
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Raw request heads received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockSseServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Mock STOMP backend
// ============================================================================

#[derive(Clone)]
pub enum StompReply {
    /// CONNECTED, then after both SUBSCRIBEs send these raw WebSocket text messages
    Accept(Vec<String>),
    /// ERROR frame instead of CONNECTED
    Reject(&'static str),
}

/// WebSocket server running a scripted STOMP session per connection
pub struct MockStompServer {
    pub addr: SocketAddr,
    connect_frames: Arc<Mutex<Vec<String>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<Notify>,
}

impl MockStompServer {
    pub async fn start(reply: StompReply, expected_subscriptions: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect_frames = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(Notify::new());

        let connects_in = Arc::clone(&connect_frames);
        let subs_in = Arc::clone(&subscriptions);
        let shutdown_in = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let reply = reply.clone();
                        let connects = Arc::clone(&connects_in);
                        let subs = Arc::clone(&subs_in);
                        let shutdown = Arc::clone(&shutdown_in);
                        tokio::spawn(async move {
                            Self::handle(stream, reply, expected_subscriptions, connects, subs, shutdown).await;
                        });
                    }
                    _ = shutdown_in.notified() => break,
                }
            }
        });

        Self {
            addr,
            connect_frames,
            subscriptions,
            shutdown,
        }
    }

    async fn handle(
        stream: TcpStream,
        reply: StompReply,
        expected_subscriptions: usize,
        connects: Arc<Mutex<Vec<String>>>,
        subscriptions: Arc<Mutex<Vec<String>>>,
        shutdown: Arc<Notify>,
    ) {
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };

        let connect = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            _ => return,
        };
        connects.lock().push(connect.to_string());

        let messages = match reply {
            StompReply::Reject(message) => {
                let error = format!("ERROR\nmessage:{}\n\n\0", message);
                let _ = ws.send(Message::Text(error)).await;
                let _ = ws.close(None).await;
                return;
            }
            StompReply::Accept(messages) => messages,
        };

        let connected = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0".to_string();
        if ws.send(Message::Text(connected)).await.is_err() {
            return;
        }

        let mut seen = 0;
        while seen < expected_subscriptions {
            match ws.next().await {
                Some(Ok(Message::Text(text))) if text.starts_with("SUBSCRIBE") => {
                    let destination = text
                        .lines()
                        .find_map(|line| line.strip_prefix("destination:"))
                        .unwrap_or_default()
                        .to_string();
                    subscriptions.lock().push(destination);
                    seen += 1;
                }
                Some(Ok(_)) => {}
                _ => return,
            }
        }

        for message in messages {
            if ws.send(Message::Text(message)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                _ = shutdown.notified() => break,
            }
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws/websocket", self.addr)
    }

    pub fn connect_frames(&self) -> Vec<String> {
        self.connect_frames.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockStompServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// STOMP MESSAGE frame as the broker would send it
pub fn stomp_message(destination: &str, body: &str) -> String {
    format!(
        "MESSAGE\ndestination:{}\nsubscription:sub-0\nmessage-id:m-1\ncontent-type:application/json\n\n{}\0",
        destination, body
    )
}
