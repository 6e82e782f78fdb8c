//! Shared application state.

use parking_lot::RwLock;
use webk_chat::LLMConfig;
use webk_core::WebKConfig;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: WebKConfig,
    pub llm_config: RwLock<LLMConfig>,
    /// Outbound client for provider calls; reused across requests.
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: WebKConfig, llm_config: LLMConfig) -> Self {
        Self {
            config,
            llm_config: RwLock::new(llm_config),
            client: reqwest::Client::new(),
        }
    }
}
