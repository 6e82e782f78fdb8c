//! Chat relay: conversation state, the streaming client the page talks to,
//! and the LLM provider streaming used by the relay backend.
//!
//! LLM calls go to external APIs; no local model is required.

pub mod config;
pub mod conversation;
pub mod prompt;
pub mod providers;
pub mod relay;
pub mod sse;
pub mod types;

pub use config::LLMConfig;
pub use conversation::{ChatStatus, Conversation};
pub use relay::{ActiveStream, ChatRelay};
pub use types::*;
