use std::sync::Arc;

use crate::error::{ApiError, ApiResult, PolicyKind};
use crate::limiter::{Identity, RateLimiter};
use crate::moderation::{ModerationGate, OptionSubject, OptionVerdict};
use crate::store::{DebateStore, OptionStore, Store, WriteOutcome};
use crate::types::*;

pub const MAX_OPTION_NAME_CHARS: usize = 100;

fn options_locked() -> ApiError {
    ApiError::policy(
        PolicyKind::OptionsLocked,
        "This debate does not accept new options",
    )
}

/// Admits visitor-proposed options through quota, duplicate and moderation gates
#[derive(Clone)]
pub struct SubmissionPipeline {
    store: Arc<dyn Store>,
    limiter: RateLimiter,
    gate: ModerationGate,
}

impl SubmissionPipeline {
    pub fn new(store: Arc<dyn Store>, limiter: RateLimiter, gate: ModerationGate) -> Self {
        Self {
            store,
            limiter,
            gate,
        }
    }

    /// Propose a new option for a debate.
    ///
    /// Gates run in order and stop at the first refusal: required fields,
    /// daily quota (checked only), duplicate name, parent debate, classifier.
    /// Quota is consumed only once the option is stored.
    pub async fn submit_option(
        &self,
        debate_id: &str,
        name: &str,
        identity: &Identity,
    ) -> ApiResult<DebateOption> {
        let (debate_id, name) = (debate_id.trim(), name.trim());
        if debate_id.is_empty() || name.is_empty() {
            return Err(ApiError::Validation("Missing required fields".to_string()));
        }
        if name.chars().count() > MAX_OPTION_NAME_CHARS {
            return Err(ApiError::Validation(format!(
                "Option names are limited to {} characters",
                MAX_OPTION_NAME_CHARS
            )));
        }

        let quota = self
            .limiter
            .check(identity, ActionClass::OptionCreation)
            .await;
        if !quota.allowed {
            let limit = self.limiter.limits().option_creation.daily_limit;
            tracing::info!(debate_id, "Option refused: daily quota exhausted");
            return Err(ApiError::policy(
                PolicyKind::QuotaExhausted,
                format!(
                    "Daily limit reached. You can add up to {} options per day.",
                    limit
                ),
            ));
        }

        if self
            .store
            .find_option_by_name(debate_id, name)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict("This option already exists".to_string()));
        }

        let debate = self
            .store
            .get_debate(debate_id)
            .await?
            .ok_or(ApiError::NotFound("Debate"))?;
        if !debate.is_more_option_allowed {
            return Err(options_locked());
        }

        let verdict = self
            .gate
            .classify_option(&OptionSubject {
                debate_title: &debate.title,
                debate_description: debate.description.as_deref(),
                name,
            })
            .await;
        if let OptionVerdict::Rejected { reason } = verdict {
            return Err(ApiError::policy(
                PolicyKind::ModerationRejected,
                reason.unwrap_or_else(|| "Option rejected by AI moderator.".to_string()),
            ));
        }

        let option = DebateOption {
            id: ulid::Ulid::new().to_string(),
            debate_id: debate.id.clone(),
            name: name.to_string(),
            votes: 0,
            created_at: chrono::Utc::now(),
        };

        match self.store.insert_option(option.clone()).await? {
            WriteOutcome::Applied => {}
            // Lost a race against an identical submission
            WriteOutcome::Conflict => {
                return Err(ApiError::Conflict("This option already exists".to_string()))
            }
            WriteOutcome::Missing => return Err(ApiError::NotFound("Debate")),
            WriteOutcome::Closed => return Err(options_locked()),
        }

        self.limiter
            .consume(identity, ActionClass::OptionCreation)
            .await;

        tracing::info!(
            debate_id = %option.debate_id,
            option_id = %option.id,
            name = %option.name,
            "Option admitted"
        );
        Ok(option)
    }
}
