//! Server-Sent Events transport
//!
//! Opens `GET {base_url}{sse_path}?token=…` and turns the
//! `text/event-stream` body into [`RawFrame`]s.

use crate::core::config::ClientConfig;
use crate::traits::*;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::collections::VecDeque;
use tracing::{debug, info};

const EVENT_STREAM: &str = "text/event-stream";

/// SSE transport over reqwest
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
}

impl SseTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_url(config.sse_url(), config)
    }

    /// Connect to an explicit endpoint URL instead of the configured one
    pub fn with_url(url: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        // No overall request timeout: the body is a stream that never ends
        // by itself. Liveness is the controller's job.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn request_url(&self, credential: &Credential) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| NotifyError::Configuration(format!("invalid SSE URL {}: {}", self.url, e)))?;
        url.query_pairs_mut().append_pair("token", credential.token());
        Ok(url)
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn name(&self) -> &'static str {
        "sse"
    }

    async fn open(&self, request: &OpenRequest) -> Result<Box<dyn Connection>> {
        let url = self.request_url(&request.credential)?;
        debug!("[SSE] Opening stream for {}", request.identity);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .header(AUTHORIZATION, request.credential.bearer())
            .send()
            .await
            .map_err(|e| NotifyError::TransportOpenFailure(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(NotifyError::AuthenticationFailure(format!(
                "SSE endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(NotifyError::TransportOpenFailure(format!(
                "SSE endpoint returned {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with(EVENT_STREAM) {
            return Err(NotifyError::ProtocolError(format!(
                "expected {}, got '{}'",
                EVENT_STREAM, content_type
            )));
        }

        info!("[SSE] Stream open for {}", request.identity);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(Box::new(SseConnection::new(body)))
    }
}

/// One open event stream
pub struct SseConnection {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    parser: SseParser,
}

impl SseConnection {
    pub fn new(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            body,
            parser: SseParser::new(),
        }
    }
}

#[async_trait]
impl Connection for SseConnection {
    async fn next_frame(&mut self) -> Option<Result<RawFrame>> {
        loop {
            if let Some(frame) = self.parser.pop() {
                return Some(Ok(frame));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = self.parser.feed(&chunk) {
                        return Some(Err(e));
                    }
                }
                Some(Err(e)) => {
                    return Some(Err(NotifyError::ProtocolError(format!(
                        "SSE body error: {}",
                        e
                    ))))
                }
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        // Dropping the body stream releases the HTTP connection
        self.body = futures::stream::empty().boxed();
    }
}

/// Upper bound on one unterminated line or one event's accumulated data
pub const MAX_EVENT_BYTES: usize = 1 << 20;

/// Incremental `text/event-stream` parser
///
/// Accepts arbitrary chunk boundaries (including inside a UTF-8 sequence)
/// and yields one frame per dispatched event. Comment lines and events
/// without any `data` line are skipped.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    max_event_bytes: usize,
    event: Option<String>,
    data: Vec<String>,
    data_bytes: usize,
    ready: VecDeque<RawFrame>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_event_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_event_bytes,
            event: None,
            data: Vec::new(),
            data_bytes: 0,
            ready: VecDeque::new(),
        }
    }

    /// Consume one body chunk
    ///
    /// Fails with `ProtocolError` once a line or an event outgrows the
    /// limit; the stream is unusable after that.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            self.scanned = start;
            self.process_line(line.trim_end_matches('\r'));
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_event_bytes || self.data_bytes > self.max_event_bytes {
            self.buffer.clear();
            self.scanned = 0;
            return Err(NotifyError::ProtocolError(format!(
                "SSE event exceeds {} bytes",
                self.max_event_bytes
            )));
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Option<RawFrame> {
        self.ready.pop_front()
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data_bytes += value.len() + 1;
                self.data.push(value.to_string());
            }
            // id and retry are not used: the controller owns reconnection
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        self.data_bytes = 0;
        let data = std::mem::take(&mut self.data).join("\n");
        let event = event
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "message".to_string());
        self.ready.push_back(RawFrame::new(event, data));
    }
}
