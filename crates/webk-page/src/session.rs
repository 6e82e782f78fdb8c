//! One open chat panel: the selection, its context, and the conversation about it.

use chrono::{DateTime, Utc};
use futures::stream::AbortHandle;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use webk_chat::{ActiveStream, ChatRelay, Conversation, StreamChunk};
use webk_core::PageContext;

/// Panel color scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Auto,
    Dark,
    Light,
}

impl Theme {
    /// Next theme in the toggle cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Auto => Self::Dark,
            Self::Dark => Self::Light,
            Self::Light => Self::Auto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Dark => "Dark",
            Self::Light => "Light",
        }
    }
}

struct InFlight {
    stream_id: Uuid,
    handle: AbortHandle,
}

pub struct ModalSession {
    id: Uuid,
    selected_text: String,
    context: PageContext,
    conversation: Conversation,
    relay: ChatRelay,
    in_flight: Option<InFlight>,
    pub draft: String,
    pub theme: Theme,
    created_at: DateTime<Utc>,
}

impl ModalSession {
    /// New session whose relay carries `selected_text` and `context`.
    pub fn new(selected_text: impl Into<String>, context: PageContext, relay: &ChatRelay) -> Self {
        let selected_text = selected_text.into();
        Self {
            id: Uuid::new_v4(),
            relay: relay.clone().with_context(selected_text.clone(), context.clone()),
            selected_text,
            context,
            conversation: Conversation::new(),
            in_flight: None,
            draft: String::new(),
            theme: Theme::default(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn selected_text(&self) -> &str {
        &self.selected_text
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Send the draft (or `question` when given) and return the answer stream.
    ///
    /// Returns `None` when the text is blank or a request is already outstanding.
    pub fn submit(&mut self, question: Option<&str>) -> Option<ActiveStream> {
        if self.in_flight.is_some() {
            return None;
        }
        let text = question.map_or_else(|| self.draft.clone(), str::to_string);
        let history = self.conversation.messages().to_vec();
        let message = self.conversation.push_user(&text)?.clone();
        self.draft.clear();

        let stream = self.relay.send(&history, &message);
        self.in_flight = Some(InFlight {
            stream_id: stream.id(),
            handle: stream.abort_handle(),
        });
        Some(stream)
    }

    /// Apply a chunk from stream `stream_id`. Chunks from any stream other
    /// than the current one are dropped. Returns whether the chunk was applied.
    pub fn apply_chunk(&mut self, stream_id: Uuid, chunk: StreamChunk) -> bool {
        if !self.is_current(stream_id) {
            debug!("Dropping chunk from stale stream {}", stream_id);
            return false;
        }
        let ends = !matches!(chunk, StreamChunk::Token(_));
        self.conversation.apply(chunk);
        if ends {
            self.in_flight = None;
        }
        true
    }

    /// Stream `stream_id` ended without a terminal chunk.
    pub fn finish_stream(&mut self, stream_id: Uuid) {
        if self.is_current(stream_id) {
            self.in_flight = None;
            self.conversation.finish();
        }
    }

    /// Abort the outstanding request, keeping any partial answer.
    pub fn stop(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.handle.abort();
            self.conversation.finish();
            debug!("Stopped stream {}", flight.stream_id);
        }
    }

    fn is_current(&self, stream_id: Uuid) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.stream_id == stream_id)
    }
}

impl Drop for ModalSession {
    fn drop(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.handle.abort();
        }
    }
}
