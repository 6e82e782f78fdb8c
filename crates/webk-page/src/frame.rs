//! Cross-frame messages.
//!
//! A nested frame cannot show the panel itself, so it asks the top frame to
//! open one. Messages are tagged with a marker field and a version and are
//! validated strictly on receipt; anything else on the channel is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

pub const MESSAGE_MARKER: &str = "__webK";
pub const PROTOCOL_VERSION: u64 = 1;
const OPEN_TYPE: &str = "OPEN";

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    #[serde(rename = "__webK")]
    marker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<u64>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "selectedText")]
    selected_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameMessage {
    Open { selected_text: String },
}

impl FrameMessage {
    pub fn open(selected_text: impl Into<String>) -> Self {
        FrameMessage::Open {
            selected_text: selected_text.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        let FrameMessage::Open { selected_text } = self;
        serde_json::json!({
            MESSAGE_MARKER: true,
            "v": PROTOCOL_VERSION,
            "type": OPEN_TYPE,
            "selectedText": selected_text,
        })
    }

    /// Parse a received message; `None` unless it is a well-formed envelope.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        // Present-but-null versions are rejected along with wrong ones.
        if object.get("v").is_some_and(|v| v.as_u64() != Some(PROTOCOL_VERSION)) {
            trace!("Ignoring message with unsupported version");
            return None;
        }
        let envelope: Envelope = match serde_json::from_value(value.clone()) {
            Ok(e) => e,
            Err(e) => {
                trace!("Ignoring malformed message: {}", e);
                return None;
            }
        };
        if !envelope.marker || envelope.kind != OPEN_TYPE {
            return None;
        }
        Some(FrameMessage::Open {
            selected_text: envelope.selected_text,
        })
    }
}

/// Sending side of the channel to the top frame. Posting never fails from
/// the caller's point of view; a closed channel drops the message.
#[derive(Debug, Clone)]
pub struct FramePort {
    tx: UnboundedSender<Value>,
}

impl FramePort {
    pub fn post(&self, message: &FrameMessage) {
        self.post_raw(message.to_value());
    }

    /// Post an arbitrary value, as any script on the page can.
    pub fn post_raw(&self, value: Value) {
        if self.tx.send(value).is_err() {
            trace!("Top frame is gone; message dropped");
        }
    }
}

pub fn channel() -> (FramePort, UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FramePort { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let value = FrameMessage::open("fox").to_value();
        assert_eq!(
            value,
            json!({"__webK": true, "v": 1, "type": "OPEN", "selectedText": "fox"})
        );
        assert_eq!(FrameMessage::from_value(&value), Some(FrameMessage::open("fox")));
    }

    #[test]
    fn test_version_is_optional() {
        let value = json!({"__webK": true, "type": "OPEN", "selectedText": "fox"});
        assert_eq!(FrameMessage::from_value(&value), Some(FrameMessage::open("fox")));
    }

    #[test]
    fn test_rejects_anything_else() {
        let rejected = [
            json!("OPEN"),
            json!(null),
            json!(["__webK"]),
            json!({"type": "OPEN", "selectedText": "fox"}),
            json!({"__webK": "true", "type": "OPEN", "selectedText": "fox"}),
            json!({"__webK": 1, "type": "OPEN", "selectedText": "fox"}),
            json!({"__webK": false, "type": "OPEN", "selectedText": "fox"}),
            json!({"__webK": true, "v": 2, "type": "OPEN", "selectedText": "fox"}),
            json!({"__webK": true, "v": null, "type": "OPEN", "selectedText": "fox"}),
            json!({"__webK": true, "type": "CLOSE", "selectedText": "fox"}),
            json!({"__webK": true, "type": "OPEN", "selectedText": 42}),
            json!({"__webK": true, "type": "OPEN"}),
            json!({"__webK": true, "type": "OPEN", "selectedText": "fox", "extra": 1}),
        ];
        for value in &rejected {
            assert_eq!(FrameMessage::from_value(value), None, "{}", value);
        }
    }

    #[tokio::test]
    async fn test_post_after_receiver_dropped_is_silent() {
        let (port, mut rx) = channel();
        port.post(&FrameMessage::open("a"));
        assert!(rx.recv().await.is_some());
        drop(rx);
        port.post(&FrameMessage::open("b"));
    }
}
