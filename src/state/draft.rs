use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult, PolicyKind};
use crate::limiter::{Identity, RateLimiter};
use crate::llm::{extract_json_object, GenerateRequest, LlmError, LlmManager};
use crate::types::*;

const MAX_PROMPT_CHARS: usize = 300;

/// Draft suggested for a visitor's topic; submitted later as a regular debate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub sub_category: String,
    pub options: Vec<String>,
}

fn system_prompt() -> String {
    format!(
        r#"You are a creative debate assistant. Turn a short visitor topic into a debate for a voting platform.

Valid categories: {}

Rules:
1. Title: keep the visitor's question. Only fix capitalization or add a missing "?".
2. Description: about two short sentences of context.
3. Category: exactly one of the valid categories above.
4. SubCategory: a specific niche, e.g. "Smartphones" for "Technology".
5. Options: short, precise entities such as "Cats", "Dogs", "Python". Never full sentences.

Answer with strict JSON only:
{{"title": "string", "description": "string", "category": "string", "subCategory": "string", "options": ["string", "string"]}}"#,
        CATEGORIES.join(", ")
    )
}

fn text_field(answer: &serde_json::Map<String, Value>, key: &str) -> String {
    answer
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Shape the model's answer into a draft; `None` when it is unusable
fn parse_draft(text: &str) -> Option<DebateDraft> {
    let answer = extract_json_object(text)?;
    let title = text_field(&answer, "title");
    let options: Vec<String> = answer
        .get("options")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if title.is_empty() || options.len() < 2 {
        return None;
    }

    let category = canonical_category(&text_field(&answer, "category"))
        .unwrap_or(FALLBACK_CATEGORY)
        .to_string();

    Some(DebateDraft {
        title,
        description: text_field(&answer, "description"),
        category,
        sub_category: text_field(&answer, "subCategory"),
        options,
    })
}

/// AI-assisted drafting behind its own daily quota
#[derive(Clone)]
pub struct DraftService {
    llm: Option<Arc<LlmManager>>,
    limiter: RateLimiter,
    timeout: Duration,
    max_tokens: u32,
}

impl DraftService {
    pub fn new(
        llm: Option<Arc<LlmManager>>,
        limiter: RateLimiter,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            llm,
            limiter,
            timeout,
            max_tokens,
        }
    }

    /// Generate a draft for a topic. Quota is checked up front and consumed
    /// only when a usable draft comes back.
    pub async fn generate_draft(&self, prompt: &str, identity: &Identity) -> ApiResult<DebateDraft> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ApiError::Validation("Prompt is required".to_string()));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ApiError::Validation(format!(
                "Prompts are limited to {} characters",
                MAX_PROMPT_CHARS
            )));
        }

        let Some(llm) = &self.llm else {
            return Err(ApiError::Unavailable(
                "AI drafting is not available right now".to_string(),
            ));
        };

        let quota = self
            .limiter
            .check(identity, ActionClass::DraftGeneration)
            .await;
        if !quota.allowed {
            let limit = self.limiter.limits().draft_generation.daily_limit;
            return Err(ApiError::policy(
                PolicyKind::QuotaExhausted,
                format!(
                    "Daily limit reached. You can generate {} debates per day.",
                    limit
                ),
            ));
        }

        let request = GenerateRequest {
            system: system_prompt(),
            prompt: format!("Visitor topic: {}", prompt),
            max_tokens: Some(self.max_tokens),
            timeout: llm.attempt_timeout(self.timeout),
        };
        let response = tokio::time::timeout(self.timeout, llm.generate(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))
            .and_then(|result| result);

        let response = match response {
            Ok(response) => response,
            Err(LlmError::ParseError(e)) => {
                tracing::warn!("Draft provider answered without content: {}", e);
                return Err(ApiError::Upstream(
                    "Failed to generate debate content".to_string(),
                ));
            }
            Err(e) => {
                tracing::warn!("Draft generation failed: {}", e);
                return Err(ApiError::Unavailable(
                    "AI drafting is not available right now".to_string(),
                ));
            }
        };

        let Some(draft) = parse_draft(&response.text) else {
            tracing::warn!(
                provider = %response.metadata.provider,
                "Draft answer was not a usable debate"
            );
            return Err(ApiError::Upstream(
                "Failed to generate debate content".to_string(),
            ));
        };

        self.limiter
            .consume(identity, ActionClass::DraftGeneration)
            .await;
        tracing::info!(title = %draft.title, category = %draft.category, "Draft generated");
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::LimitsConfig;
    use crate::llm::{GenerateResponse, LlmProvider, LlmResult, ResponseMetadata};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    const GOOD: &str = r#"```json
{"title": "Cats or dogs?", "description": "The eternal question.", "category": "pets", "subCategory": "Companions", "options": ["Cats", "Dogs", " "]}
```"#;

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

    struct Down;

    #[async_trait]
    impl LlmProvider for Down {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Err(LlmError::ApiError("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn service(provider: Option<Box<dyn LlmProvider>>) -> DraftService {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), LimitsConfig::default());
        let llm = provider.map(|p| Arc::new(LlmManager::new(vec![p])));
        DraftService::new(llm, limiter, Duration::from_secs(1), 300)
    }

    fn ip() -> Identity {
        Identity::Known("203.0.113.20".to_string())
    }

    #[test]
    fn test_parse_draft_normalizes_fields() {
        let draft = parse_draft(GOOD).unwrap();
        assert_eq!(draft.title, "Cats or dogs?");
        assert_eq!(draft.category, "Pets");
        assert_eq!(draft.sub_category, "Companions");
        assert_eq!(draft.options, vec!["Cats", "Dogs"]);
    }

    #[test]
    fn test_parse_draft_rejects_unusable_answers() {
        assert!(parse_draft("no json here").is_none());
        assert!(parse_draft(r#"{"title": "Only one?", "options": ["A"]}"#).is_none());
        assert!(parse_draft(r#"{"options": ["A", "B"]}"#).is_none());
    }

    #[test]
    fn test_system_prompt_lists_categories() {
        let prompt = system_prompt();
        assert!(prompt.contains("Technology"));
        assert!(prompt.contains("\"subCategory\""));
    }

    #[tokio::test]
    async fn test_quota_consumed_only_on_success() {
        let broken = service(Some(Box::new(Fixed("I cannot do that."))));
        for _ in 0..5 {
            let err = broken.generate_draft("Cats or dogs", &ip()).await.unwrap_err();
            assert!(matches!(err, ApiError::Upstream(_)));
        }

        let working = service(Some(Box::new(Fixed(GOOD))));
        for _ in 0..3 {
            working.generate_draft("Cats or dogs", &ip()).await.unwrap();
        }
        let err = working
            .generate_draft("Cats or dogs", &ip())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Policy {
                kind: PolicyKind::QuotaExhausted,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_or_failing_provider_is_unavailable() {
        let err = service(None)
            .generate_draft("Cats or dogs", &ip())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));

        let err = service(Some(Box::new(Down)))
            .generate_draft("Cats or dogs", &ip())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let err = service(Some(Box::new(Fixed(GOOD))))
            .generate_draft("   ", &ip())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
