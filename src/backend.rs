//! Response stream source
//!
//! The controller consumes an ordered stream of [`StreamEvent`]s. The HTTP
//! backend speaks the OpenAI-compatible `/chat/completions` SSE format, with
//! a few extra event objects for loading phases, citations and errors:
//!
//! ```text
//! data: {"type":"indicator","status":"Searching the notes","icon":"searching"}
//! data: {"type":"citations","citations":[{"source_url":"...","source_description":"..."}]}
//! data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}
//! data: [DONE]
//! ```

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::session::{Citation, IndicatorPhase, PhaseIcon, Turn};
use crate::{ChatError, Result};

const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One event of a response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Backend entered a new stage of producing the answer
    Phase(IndicatorPhase),
    /// Next piece of answer text
    Fragment(String),
    /// Sources backing the answer
    Citations(Vec<Citation>),
    Done,
    Failed(String),
}

impl StreamEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Failed(_))
    }
}

/// Something that can answer a conversation with a stream of events
pub trait ResponseBackend: Send + Sync {
    /// Open a response stream for `history`, whose last turn is the new
    /// user message.
    fn open_stream(
        &self,
        history: Vec<Turn>,
    ) -> impl Future<Output = Result<mpsc::Receiver<StreamEvent>>> + Send;
}

// ─── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

// ─── SSE decoding ───────────────────────────────────────────────────

/// Splits a byte stream into lines, holding back incomplete ones.
///
/// Works on bytes so a multi-byte character split across two network
/// chunks is decoded only once both halves arrived.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Take a trailing line the body ended on without a newline
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest);
        Some(text.trim_end_matches('\r').to_string())
    }
}

/// Decode one SSE line into stream events.
///
/// Lines that are not `data:` payloads, and payloads we do not understand,
/// yield nothing.
pub fn parse_sse_line(line: &str) -> Vec<StreamEvent> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Vec::new();
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return vec![StreamEvent::Done];
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping malformed SSE payload: {e}");
            return Vec::new();
        }
    };

    if let Some(kind) = value.get("type").and_then(|t| t.as_str()) {
        return parse_typed_event(kind, &value);
    }

    if let Some(message) = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return vec![StreamEvent::Failed(message.to_string())];
    }

    let Ok(chunk) = serde_json::from_value::<StreamChunk>(value) else {
        return Vec::new();
    };
    let mut events = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(StreamEvent::Fragment(content));
        }
        if choice.finish_reason.is_some() {
            events.push(StreamEvent::Done);
        }
    }
    events
}

fn parse_typed_event(kind: &str, value: &serde_json::Value) -> Vec<StreamEvent> {
    let text = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    match kind {
        "indicator" | "loading" => {
            let status = text("status").unwrap_or_default();
            let icon = text("icon")
                .map(|name| PhaseIcon::from_name(&name))
                .unwrap_or_default();
            vec![StreamEvent::Phase(IndicatorPhase::new(status).with_icon(icon))]
        }
        "citations" => {
            let citations = value
                .get("citations")
                .cloned()
                .and_then(|c| serde_json::from_value::<Vec<Citation>>(c).ok())
                .unwrap_or_default();
            vec![StreamEvent::Citations(citations)]
        }
        "error" => {
            let message = text("message").unwrap_or_else(|| "backend error".to_string());
            vec![StreamEvent::Failed(message)]
        }
        "done" => vec![StreamEvent::Done],
        other => {
            debug!("Ignoring SSE event type {other}");
            Vec::new()
        }
    }
}

// ─── HTTP backend ───────────────────────────────────────────────────

/// OpenAI-compatible streaming chat backend
pub struct HttpBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("chatpane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Http(e.to_string()))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            debug!("No API key in ${}, sending unauthenticated requests", config.api_key_env);
        }

        info!("Chat backend: base_url={}, model={}", config.base_url, config.model);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = extract_error_detail(&body);
        if detail.is_empty() {
            Err(ChatError::StreamFailed(format!("API error {status}")))
        } else {
            Err(ChatError::StreamFailed(format!("API error {status}: {detail}")))
        }
    }

    fn map_reqwest_error(e: reqwest::Error) -> ChatError {
        if e.is_timeout() {
            ChatError::StreamFailed(format!("timeout: {e}"))
        } else if e.is_connect() {
            ChatError::StreamFailed(format!("network: {e}"))
        } else {
            ChatError::Http(e.to_string())
        }
    }
}

impl ResponseBackend for HttpBackend {
    async fn open_stream(&self, history: Vec<Turn>) -> Result<mpsc::Receiver<StreamEvent>> {
        let request = ChatRequest {
            model: &self.model,
            messages: history
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            stream: true,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Failed(format!("stream error: {e}"))).await;
                        return;
                    }
                };
                if forward_lines(&tx, lines.push(&bytes)).await {
                    return;
                }
            }
            if forward_lines(&tx, lines.finish()).await {
                return;
            }
            warn!("Response stream ended without [DONE]");
            let _ = tx
                .send(StreamEvent::Failed(
                    "response stream ended before completion".to_string(),
                ))
                .await;
        });

        Ok(rx)
    }
}

/// Send the events decoded from `lines`. Returns true once the stream is
/// over: a terminal event went out or the receiver was dropped.
async fn forward_lines(
    tx: &mpsc::Sender<StreamEvent>,
    lines: impl IntoIterator<Item = String>,
) -> bool {
    for line in lines {
        for event in parse_sse_line(&line) {
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() || terminal {
                return true;
            }
        }
    }
    false
}

fn extract_error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }

    trimmed.chars().take(500).collect()
}
