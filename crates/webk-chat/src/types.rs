//! Chat types matching the UI-message wire format used between the page and the relay.

use serde::{Deserialize, Serialize};
use webk_core::PageContext;

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    Gemini,
    OpenAI,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a UI message. Only text parts are produced; other part kinds
/// sent by newer clients are kept as opaque values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// A message as exchanged with the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl UiMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// Concatenated text of all text parts.
    pub fn plain_text(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                MessagePart::Text { text } => text.as_str(),
                MessagePart::Other => "",
            })
            .collect()
    }
}

/// Plain role/content pair sent to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of `POST /api/ask`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default, rename = "selectedText")]
    pub selected_text: String,
    #[serde(default, rename = "pageContext", skip_serializing_if = "Option::is_none")]
    pub page_context: Option<PageContext>,
    #[serde(default)]
    pub messages: Vec<UiMessage>,
    /// Single-question form accepted from older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl AskRequest {
    /// The question to answer: last user message, else the legacy `question` field.
    pub fn latest_question(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(UiMessage::plain_text)
            .or_else(|| self.question.clone())
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
    }
}

/// SSE event in the UI message stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Finish,
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

/// A single streamed token or error.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done { tokens_used: usize },
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_message_wire_shape() {
        let msg = UiMessage::text(Role::User, "What is this?");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["parts"][0]["type"], "text");
        assert_eq!(value["parts"][0]["text"], "What is this?");
    }

    #[test]
    fn test_unknown_parts_are_tolerated() {
        let msg: UiMessage = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "role": "assistant",
            "parts": [{"type": "step-start"}, {"type": "text", "text": "Hi"}],
        }))
        .unwrap();
        assert_eq!(msg.plain_text(), "Hi");
    }

    #[test]
    fn test_latest_question_prefers_messages() {
        let req = AskRequest {
            selected_text: "fox".into(),
            messages: vec![
                UiMessage::text(Role::User, "first"),
                UiMessage::text(Role::Assistant, "answer"),
                UiMessage::text(Role::User, "  second  "),
            ],
            question: Some("legacy".into()),
            ..Default::default()
        };
        assert_eq!(req.latest_question().as_deref(), Some("second"));
    }

    #[test]
    fn test_latest_question_legacy_field() {
        let req: AskRequest =
            serde_json::from_str(r#"{"selectedText":"fox","question":"why?"}"#).unwrap();
        assert_eq!(req.latest_question().as_deref(), Some("why?"));

        let empty: AskRequest = serde_json::from_str(r#"{"selectedText":"fox"}"#).unwrap();
        assert!(empty.latest_question().is_none());
    }

    #[test]
    fn test_stream_event_tags() {
        let event = StreamEvent::TextDelta { id: "t".into(), delta: "Hel".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"text-delta","id":"t","delta":"Hel"}"#);

        let parsed: StreamEvent =
            serde_json::from_str(r#"{"type":"error","errorText":"boom"}"#).unwrap();
        assert_eq!(parsed, StreamEvent::Error { error_text: "boom".into() });
    }
}
