mod ollama;
mod openai;

use async_trait::async_trait;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request sent to a text-generation provider
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions describing the task and the expected output format
    pub system: String,
    /// The material to work on
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Configured providers, tried in order
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Even share of `budget` for each provider, so a provider that runs
    /// into its timeout still leaves time for the ones after it
    pub fn attempt_timeout(&self, budget: Duration) -> Duration {
        let providers = u32::try_from(self.providers.len().max(1)).unwrap_or(u32::MAX);
        budget / providers
    }

    /// Generate from the first provider that answers; the last error is
    /// returned when all of them fail. Each attempt is bounded by
    /// `request.timeout`.
    pub async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let mut last_error =
            LlmError::ConfigError("No LLM providers configured".to_string());

        for provider in &self.providers {
            let attempt = tokio::time::timeout(request.timeout, provider.generate(request.clone()))
                .await
                .unwrap_or(Err(LlmError::Timeout(request.timeout)));
            match attempt {
                Ok(response) => {
                    tracing::debug!(
                        provider = %response.metadata.provider,
                        model = %response.metadata.model,
                        tokens = ?response.metadata.tokens_used,
                        latency_ms = response.metadata.latency_ms,
                        "LLM answered"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Locate the first well-formed JSON object in a model answer.
///
/// Models like to wrap their JSON in prose or markdown fences; anything
/// that does not contain a complete object yields `None`.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            let mut stream =
                serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
            match stream.next() {
                Some(Ok(serde_json::Value::Object(map))) => Some(map),
                _ => None,
            }
        })
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 300,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: non_empty_var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: non_empty_var("OLLAMA_BASE_URL"),
            ollama_model: non_empty_var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmProvider for Fixed {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: self.0.to_string(),
                metadata: ResponseMetadata {
                    provider: "fixed".to_string(),
                    model: "fixed".to_string(),
                    tokens_used: None,
                    latency_ms: 0,
                },
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Broken;

    #[async_trait]
    impl LlmProvider for Broken {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Err(LlmError::ApiError("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    /// Never answers on its own
    struct Hanging;

    #[async_trait]
    impl LlmProvider for Hanging {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(LlmError::Timeout(request.timeout))
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            system: "classify".to_string(),
            prompt: "Cats or dogs?".to_string(),
            max_tokens: None,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let text = "Sure! Here you go:\n```json\n{\"moderation\": \"SAFE\", \"tags\": [\"a\"]}\n```\nAnything else?";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["moderation"], "SAFE");
    }

    #[test]
    fn test_extract_json_object_skips_broken_candidates() {
        let text = "{not json} then {\"moderation\": \"SPAM\"}";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["moderation"], "SPAM");
    }

    #[test]
    fn test_extract_json_object_rejects_non_objects() {
        assert!(extract_json_object("I cannot help with that.").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("{\"moderation\": \"SAFE\"").is_none());
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.ollama_model, "llama3.2");
        assert_eq!(config.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_build_manager_requires_a_provider() {
        let result = LlmConfig::default().build_manager();
        assert!(matches!(result, Err(LlmError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_manager_falls_back_to_next_provider() {
        let manager = LlmManager::new(vec![Box::new(Broken), Box::new(Fixed("{}"))]);
        let response = manager.generate(request()).await.unwrap();
        assert_eq!(response.text, "{}");
    }

    #[tokio::test]
    async fn test_manager_returns_last_error() {
        let manager = LlmManager::new(vec![Box::new(Broken)]);
        let result = manager.generate(request()).await;
        assert!(matches!(result, Err(LlmError::ApiError(_))));
    }

    #[test]
    fn test_attempt_timeout_splits_budget() {
        let pair = LlmManager::new(vec![Box::new(Broken), Box::new(Fixed("{}"))]);
        assert_eq!(
            pair.attempt_timeout(Duration::from_secs(10)),
            Duration::from_secs(5)
        );
        let empty = LlmManager::new(vec![]);
        assert_eq!(
            empty.attempt_timeout(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_leaves_time_for_fallback() {
        let manager = LlmManager::new(vec![Box::new(Hanging), Box::new(Fixed("{}"))]);
        let budget = Duration::from_secs(2);
        let request = GenerateRequest {
            timeout: manager.attempt_timeout(budget),
            ..request()
        };
        let response = tokio::time::timeout(budget, manager.generate(request))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.text, "{}");
    }
}
