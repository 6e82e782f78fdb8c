//! Conversation state for one chat session.

use serde::Serialize;

use crate::types::{MessagePart, Role, StreamChunk, UiMessage};

/// Where the conversation is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Ready,
    Submitted,
    Streaming,
    Error,
}

impl ChatStatus {
    /// True while a request is outstanding.
    pub fn is_busy(self) -> bool {
        matches!(self, ChatStatus::Submitted | ChatStatus::Streaming)
    }
}

/// Messages exchanged so far plus request status.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    messages: Vec<UiMessage>,
    status: ChatStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            status: ChatStatus::Ready,
            error: None,
        }
    }

    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start a new turn. Returns `None` when busy or the text is blank.
    pub fn push_user(&mut self, text: &str) -> Option<&UiMessage> {
        let text = text.trim();
        if text.is_empty() || self.status.is_busy() {
            return None;
        }
        self.error = None;
        self.status = ChatStatus::Submitted;
        self.messages.push(UiMessage::text(Role::User, text));
        self.messages.last()
    }

    /// Fold one streamed chunk into the conversation.
    pub fn apply(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Token(text) => self.append_assistant(&text),
            StreamChunk::Done { .. } => self.finish(),
            StreamChunk::Error(message) => {
                self.status = ChatStatus::Error;
                self.error = Some(message);
            }
        }
    }

    /// Stream ended (completed, aborted or dropped). Partial output stays.
    pub fn finish(&mut self) {
        if self.status.is_busy() {
            self.status = ChatStatus::Ready;
        }
    }

    /// Text of the most recent assistant message.
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(UiMessage::plain_text)
            .unwrap_or_default()
    }

    fn append_assistant(&mut self, text: &str) {
        if self.status == ChatStatus::Error {
            return;
        }
        self.status = ChatStatus::Streaming;

        let needs_new = self
            .messages
            .last()
            .map_or(true, |m| m.role != Role::Assistant);
        if needs_new {
            self.messages.push(UiMessage::text(Role::Assistant, ""));
        }

        if let Some(last) = self.messages.last_mut() {
            match last.parts.last_mut() {
                Some(MessagePart::Text { text: existing }) => existing.push_str(text),
                _ => last.parts.push(MessagePart::Text { text: text.to_string() }),
            }
        }
    }
}
