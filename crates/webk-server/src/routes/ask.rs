//! Ask routes: one question about a page selection, answered as a UI message stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::state::AppState;
use webk_chat::config::LLMStatus;
use webk_chat::prompt::{build_messages, system_prompt};
use webk_chat::providers::{self, GenerationParams};
use webk_chat::types::{AskRequest, StreamChunk, StreamEvent};

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

const MISSING_FIELDS: &str = "Missing selectedText or question in request body";

/// Header identifying the UI message stream protocol to clients.
const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ask", post(ask))
        .route("/ask/status", get(get_status))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<LLMStatus> {
    Json(state.llm_config.read().status())
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn ask(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Could not read ask body: {}", rejection);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process request");
        }
    };

    let selected_text = req.selected_text.trim().to_string();
    if selected_text.is_empty() || req.latest_question().is_none() {
        return json_error(StatusCode::BAD_REQUEST, MISSING_FIELDS);
    }

    let resolved = {
        let config = state.llm_config.read();
        config.resolve_provider().map(|(provider, model, api_key)| {
            (
                provider,
                GenerationParams {
                    model,
                    api_key,
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                    base_url: config.base_url(provider),
                },
            )
        })
    };
    let Some((provider, params)) = resolved else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "No LLM provider configured");
    };

    info!(
        "Ask: {} chars selected, {} messages, provider {} ({})",
        selected_text.chars().count(),
        req.messages.len(),
        provider,
        params.model
    );

    let system = system_prompt(&selected_text, req.page_context.as_ref());
    let messages = build_messages(&req);
    let llm_stream = providers::stream_llm(&state.client, provider, system, messages, params);

    let message_id = Uuid::new_v4().to_string();
    let text_id = Uuid::new_v4().to_string();

    let sse_stream: SseStream = Box::pin(async_stream::stream! {
        yield Ok::<_, Infallible>(event(&StreamEvent::Start { message_id }));
        yield Ok(event(&StreamEvent::TextStart { id: text_id.clone() }));

        tokio::pin!(llm_stream);
        while let Some(chunk) = llm_stream.next().await {
            match chunk {
                StreamChunk::Token(delta) => {
                    yield Ok(event(&StreamEvent::TextDelta { id: text_id.clone(), delta }));
                }
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => {
                    error!("Provider stream failed: {}", e);
                    yield Ok(event(&StreamEvent::Error { error_text: e }));
                    yield Ok(Event::default().data("[DONE]"));
                    return;
                }
            }
        }

        yield Ok(event(&StreamEvent::TextEnd { id: text_id }));
        yield Ok(event(&StreamEvent::Finish));
        yield Ok(Event::default().data("[DONE]"));
    });

    ([(UI_STREAM_HEADER, "v1")], Sse::new(sse_stream)).into_response()
}

fn event(ev: &StreamEvent) -> Event {
    match serde_json::to_string(ev) {
        Ok(data) => Event::default().data(data),
        Err(e) => Event::default().comment(format!("unencodable event: {}", e)),
    }
}
