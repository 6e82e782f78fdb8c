//! LLM provider configuration read from the environment.

use serde::Serialize;

use crate::types::LLMProvider;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: usize = 2048;

/// Provider keys and model choices for the relay backend.
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub preferred_provider: String,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_model: String,
    pub temperature: f64,
    pub max_tokens: usize,
    pub gemini_base_url: Option<String>,
    pub openai_base_url: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: "auto".into(),
            gemini_api_key: None,
            openai_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            gemini_base_url: None,
            openai_base_url: None,
        }
    }
}

/// Public view of the config (no API keys exposed).
#[derive(Debug, Clone, Serialize)]
pub struct LLMStatus {
    #[serde(rename = "llmAvailable")]
    pub llm_available: bool,
    #[serde(rename = "llmProvider")]
    pub llm_provider: Option<String>,
    #[serde(rename = "defaultModel")]
    pub default_model: Option<String>,
}

impl LLMConfig {
    /// Load config from env vars and defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(p) = non_empty("WEBK_PROVIDER") {
            config.preferred_provider = p.to_lowercase();
        }
        config.gemini_api_key =
            non_empty("GOOGLE_GENERATIVE_AI_API_KEY").or_else(|| non_empty("GEMINI_API_KEY"));
        config.openai_api_key = non_empty("OPENAI_API_KEY");
        config.gemini_base_url = non_empty("GEMINI_BASE_URL");
        config.openai_base_url = non_empty("OPENAI_BASE_URL");

        if let Some(model) = non_empty("WEBK_MODEL") {
            match config.preferred_provider.as_str() {
                "openai" => config.openai_model = model,
                _ => config.gemini_model = model,
            }
        }
        if let Some(t) = non_empty("WEBK_TEMPERATURE").and_then(|t| t.parse().ok()) {
            config.temperature = t;
        }
        if let Some(m) = non_empty("WEBK_MAX_TOKENS").and_then(|m| m.parse().ok()) {
            config.max_tokens = m;
        }

        config
    }

    /// Resolve which provider, model and key to use.
    pub fn resolve_provider(&self) -> Option<(LLMProvider, String, String)> {
        let gemini = || {
            self.gemini_api_key
                .as_ref()
                .map(|k| (LLMProvider::Gemini, self.gemini_model.clone(), k.clone()))
        };
        let openai = || {
            self.openai_api_key
                .as_ref()
                .map(|k| (LLMProvider::OpenAI, self.openai_model.clone(), k.clone()))
        };

        match self.preferred_provider.as_str() {
            "gemini" => gemini(),
            "openai" => openai(),
            "auto" => gemini().or_else(openai),
            _ => None,
        }
    }

    /// API base override for `provider`, if one is configured.
    pub fn base_url(&self, provider: LLMProvider) -> Option<String> {
        match provider {
            LLMProvider::Gemini => self.gemini_base_url.clone(),
            LLMProvider::OpenAI => self.openai_base_url.clone(),
        }
    }

    pub fn status(&self) -> LLMStatus {
        let resolved = self.resolve_provider();
        LLMStatus {
            llm_available: resolved.is_some(),
            llm_provider: resolved.as_ref().map(|(p, _, _)| p.to_string()),
            default_model: resolved.map(|(_, m, _)| m),
        }
    }
}
