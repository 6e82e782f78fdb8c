//! External LLM provider streaming implementations.
//!
//! Each provider streams tokens via SSE from its API. Gemini is the default
//! backend; OpenAI-compatible chat completions are supported as an alternative.

use std::pin::Pin;

use futures::Stream;
use reqwest::Client;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, error};

use crate::sse::{SseData, SseDecoder};
use crate::types::{ChatMessage, LLMProvider, StreamChunk};

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Generation parameters shared by all providers.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub api_key: String,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Replaces the provider's default API base (proxies, compatible servers).
    pub base_url: Option<String>,
}

impl GenerationParams {
    fn base_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .map_or(default, |b| b.trim_end_matches('/'))
    }
}

/// Stream tokens from the appropriate provider.
pub fn stream_llm(
    client: &Client,
    provider: LLMProvider,
    system: String,
    messages: Vec<ChatMessage>,
    params: GenerationParams,
) -> BoxedStream {
    match provider {
        LLMProvider::Gemini => Box::pin(stream_gemini(client.clone(), system, messages, params)),
        LLMProvider::OpenAI => {
            let url = format!("{}/chat/completions", params.base_or(OPENAI_API_BASE));
            Box::pin(stream_openai_compat(client.clone(), &url, system, messages, params))
        }
    }
}

/// Build the Gemini `generateContent` body. Assistant turns use the `model` role.
pub fn gemini_body(system: &str, messages: &[ChatMessage], params: &GenerationParams) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| {
            let role = if m.role == "assistant" { "model" } else { "user" };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    json!({
        "systemInstruction": {"parts": [{"text": system}]},
        "contents": contents,
        "generationConfig": {
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
        },
    })
}

/// Text carried by one Gemini stream payload, or its error message.
fn gemini_payload(data: &str) -> Result<Option<String>, String> {
    let parsed: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    if let Some(msg) = parsed["error"]["message"].as_str() {
        return Err(msg.to_string());
    }
    let text: String = parsed["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

/// Stream from Gemini's `streamGenerateContent` endpoint.
fn stream_gemini(
    client: Client,
    system: String,
    messages: Vec<ChatMessage>,
    params: GenerationParams,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    let url = format!(
        "{}/{}:streamGenerateContent?alt=sse",
        params.base_or(GEMINI_API_BASE),
        params.model
    );
    let body = gemini_body(&system, &messages, &params);

    async_stream::stream! {
        debug!("Streaming from Gemini with model {}", params.model);

        let response = match client
            .post(&url)
            .header("x-goog-api-key", &params.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };

            for data in decoder.push(&bytes) {
                let SseData::Payload(data) = data else { continue };
                match gemini_payload(&data) {
                    Ok(Some(text)) => {
                        token_count += 1;
                        yield StreamChunk::Token(text);
                    }
                    Ok(None) => {}
                    Err(msg) => {
                        error!("Gemini error: {}", msg);
                        yield StreamChunk::Error(msg);
                        return;
                    }
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

/// Stream from OpenAI-compatible APIs.
fn stream_openai_compat(
    client: Client,
    url: &str,
    system: String,
    messages: Vec<ChatMessage>,
    params: GenerationParams,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    let url = url.to_string();
    let msgs: Vec<serde_json::Value> = std::iter::once(json!({"role": "system", "content": system}))
        .chain(
            messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        )
        .collect();

    async_stream::stream! {
        let body = json!({
            "model": params.model,
            "messages": msgs,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": true,
        });

        debug!("Streaming from {} with model {}", url, params.model);

        let response = match client
            .post(&url)
            .header("Authorization", format!("Bearer {}", params.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };

            for data in decoder.push(&bytes) {
                let data = match data {
                    SseData::Done => {
                        yield StreamChunk::Done { tokens_used: token_count };
                        return;
                    }
                    SseData::Payload(d) => d,
                };

                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&data) {
                    if let Some(content) = parsed["choices"][0]["delta"]["content"].as_str() {
                        if !content.is_empty() {
                            token_count += 1;
                            yield StreamChunk::Token(content.to_string());
                        }
                    }
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams {
            model: "gemini-2.5-flash".into(),
            api_key: "k".into(),
            temperature: 0.3,
            max_tokens: 1024,
            base_url: None,
        }
    }

    #[test]
    fn test_base_url_override() {
        let mut p = params();
        assert_eq!(p.base_or(OPENAI_API_BASE), OPENAI_API_BASE);
        p.base_url = Some("http://127.0.0.1:8080/v1/".into());
        assert_eq!(p.base_or(OPENAI_API_BASE), "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn test_gemini_body_roles() {
        let messages = vec![
            ChatMessage { role: "user".into(), content: "q1".into() },
            ChatMessage { role: "assistant".into(), content: "a1".into() },
            ChatMessage { role: "user".into(), content: "q2".into() },
        ];
        let body = gemini_body("be brief", &messages, &params());
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "q2");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_gemini_payload_text_and_error() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        assert_eq!(gemini_payload(data), Ok(Some("Hello".into())));

        let usage_only = r#"{"usageMetadata":{"totalTokenCount":5}}"#;
        assert_eq!(gemini_payload(usage_only), Ok(None));

        let err = r#"{"error":{"code":429,"message":"Resource exhausted"}}"#;
        assert_eq!(gemini_payload(err), Err("Resource exhausted".into()));
    }
}
