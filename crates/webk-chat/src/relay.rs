//! Client side of the relay: posts the conversation plus page context to the
//! configured endpoint and streams answer tokens back.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{AbortHandle, Abortable};
use futures::Stream;
use reqwest::Client;
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;
use webk_core::{PageContext, WebKConfig};

use crate::providers::BoxedStream;
use crate::sse::{SseData, SseDecoder};
use crate::types::{StreamChunk, StreamEvent, UiMessage};

/// Request body for the relay endpoint.
#[derive(Debug, Serialize)]
struct RelayBody<'a> {
    #[serde(rename = "selectedText")]
    selected_text: &'a str,
    #[serde(rename = "pageContext", skip_serializing_if = "Option::is_none")]
    page_context: Option<&'a PageContext>,
    messages: Vec<&'a UiMessage>,
}

/// Streaming transport bound to one selection and its page context.
#[derive(Debug, Clone)]
pub struct ChatRelay {
    client: Client,
    endpoint: String,
    selected_text: String,
    page_context: Option<PageContext>,
}

impl ChatRelay {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            selected_text: String::new(),
            page_context: None,
        }
    }

    pub fn from_config(config: &WebKConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    /// Attach the selection and its context to every request sent by this relay.
    pub fn with_context(mut self, selected_text: impl Into<String>, context: PageContext) -> Self {
        self.selected_text = selected_text.into();
        self.page_context = Some(context);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post `history` followed by `message` and stream the answer.
    pub fn send(&self, history: &[UiMessage], message: &UiMessage) -> ActiveStream {
        let body = RelayBody {
            selected_text: &self.selected_text,
            page_context: self.page_context.as_ref(),
            messages: history.iter().chain(std::iter::once(message)).collect(),
        };
        let payload = serde_json::to_value(&body);

        let request = self.client.post(&self.endpoint);
        let endpoint = self.endpoint.clone();

        let stream: BoxedStream = Box::pin(async_stream::stream! {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => {
                    yield StreamChunk::Error(format!("Could not encode request: {}", e));
                    return;
                }
            };

            debug!("Posting {} messages to {}", body_len(&payload), endpoint);

            let response = match request.json(&payload).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Relay request failed: {}", e);
                    yield StreamChunk::Error(format!("Request failed: {}", e));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                yield StreamChunk::Error(error_message(status.as_u16(), &text));
                return;
            }

            let is_sse = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("text/event-stream"));

            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut pending_utf8: Vec<u8> = Vec::new();
            let mut token_count = 0usize;

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield StreamChunk::Error(format!("Stream read error: {}", e));
                        return;
                    }
                };

                if !is_sse {
                    pending_utf8.extend_from_slice(&bytes);
                    let text = take_valid_utf8(&mut pending_utf8);
                    if !text.is_empty() {
                        token_count += 1;
                        yield StreamChunk::Token(text);
                    }
                    continue;
                }

                for data in decoder.push(&bytes) {
                    match decode_event(data) {
                        Some(StreamChunk::Token(text)) => {
                            token_count += 1;
                            yield StreamChunk::Token(text);
                        }
                        Some(StreamChunk::Done { .. }) => {
                            yield StreamChunk::Done { tokens_used: token_count };
                            return;
                        }
                        Some(err @ StreamChunk::Error(_)) => {
                            yield err;
                            return;
                        }
                        None => {}
                    }
                }
            }

            if let Some(StreamChunk::Token(text)) = decoder.finish().and_then(decode_event) {
                token_count += 1;
                yield StreamChunk::Token(text);
            }

            yield StreamChunk::Done { tokens_used: token_count };
        });

        ActiveStream::new(stream)
    }
}

fn body_len(payload: &serde_json::Value) -> usize {
    payload["messages"].as_array().map_or(0, Vec::len)
}

/// Pull the longest valid UTF-8 prefix out of `buf`, keeping an incomplete tail.
fn take_valid_utf8(buf: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        // Invalid bytes rather than a split sequence: decode lossily.
        Err(_) => buf.len(),
    };
    let head: Vec<u8> = buf.drain(..valid).collect();
    String::from_utf8_lossy(&head).into_owned()
}

/// Map one SSE payload from the relay to a chunk; unknown events yield `None`.
pub fn decode_event(data: SseData) -> Option<StreamChunk> {
    let payload = match data {
        SseData::Done => return Some(StreamChunk::Done { tokens_used: 0 }),
        SseData::Payload(p) => p,
    };
    match serde_json::from_str::<StreamEvent>(&payload) {
        Ok(StreamEvent::TextDelta { delta, .. }) if !delta.is_empty() => {
            Some(StreamChunk::Token(delta))
        }
        Ok(StreamEvent::Finish) => Some(StreamChunk::Done { tokens_used: 0 }),
        Ok(StreamEvent::Error { error_text }) => Some(StreamChunk::Error(error_text)),
        Ok(_) => None,
        Err(_) => {
            debug!("Skipping unrecognized stream event");
            None
        }
    }
}

/// User-facing message for a non-success relay response.
fn error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        format!("HTTP error! status: {}", status)
    } else {
        format!("HTTP error! status: {} ({})", status, detail)
    }
}

/// A cancellable answer stream.
///
/// Aborting ends the stream at its next poll; chunks already yielded stay
/// wherever the caller put them.
pub struct ActiveStream {
    id: Uuid,
    inner: Abortable<BoxedStream>,
    handle: AbortHandle,
}

impl ActiveStream {
    pub fn new(stream: BoxedStream) -> Self {
        let (handle, registration) = AbortHandle::new_pair();
        Self {
            id: Uuid::new_v4(),
            inner: Abortable::new(stream, registration),
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle that can stop this stream from elsewhere.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl Stream for ActiveStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
