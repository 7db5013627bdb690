use std::time::Duration;

use serde::Deserialize;

/// Environment variable for the OpenAI-compatible API root.
pub const ENV_LLM_BASE_URL: &str = "SCOUT_LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "SCOUT_LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "SCOUT_LLM_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Reasoning-service endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Build from an arbitrary variable source; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            base_url: non_empty(ENV_LLM_BASE_URL)
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key: non_empty(ENV_LLM_API_KEY),
            model: non_empty(ENV_LLM_MODEL).unwrap_or_else(|| DEFAULT_MODEL.into()),
            temperature: 0.7,
            max_tokens: 8192,
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Check if the endpoint answers `GET /models` within a few seconds.
pub async fn check_endpoint(config: &LlmConfig) -> bool {
    let mut request = reqwest::Client::new()
        .get(format!("{}/models", config.base_url))
        .timeout(Duration::from_secs(5));
    if let Some(key) = &config.api_key {
        request = request.bearer_auth(key);
    }
    match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = LlmConfig::from_lookup(|_| None);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_none());
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_lookup_overrides_and_trims_slash() {
        let vars: HashMap<&str, &str> = [
            (ENV_LLM_BASE_URL, "http://localhost:8080/v1/"),
            (ENV_LLM_API_KEY, "sk-test"),
            (ENV_LLM_MODEL, ""),
        ]
        .into_iter()
        .collect();
        let config = LlmConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, DEFAULT_MODEL);
    }
}
