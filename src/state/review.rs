use std::sync::Arc;

use crate::error::{ApiError, ApiResult, PolicyKind};
use crate::store::{DebateStore, StatusWrite, Store};
use crate::types::*;

/// Attempts before giving up on a debate whose status keeps moving under us
const MAX_REVIEW_ATTEMPTS: usize = 4;

/// Human review of debates after automated classification
#[derive(Clone)]
pub struct ModerationWorkflow {
    store: Arc<dyn Store>,
}

impl ModerationWorkflow {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Check if a review transition is valid
    fn is_valid_transition(from: DebateStatus, to: DebateStatus) -> bool {
        use DebateStatus::*;

        match (from, to) {
            (Pending, Approved) => true,
            (Pending, Rejected) => true,

            // Reapplying a decision re-asserts the same fields
            (Approved, Approved) => true,
            (Rejected, Rejected) => true,

            // Rejection is terminal, approval only moves through field edits
            _ => false,
        }
    }

    async fn transition(
        &self,
        id: &str,
        to: DebateStatus,
        reason: Option<String>,
    ) -> ApiResult<Debate> {
        let debate = self
            .store
            .get_debate(id)
            .await?
            .ok_or(ApiError::NotFound("Debate"))?;
        self.transition_from(id, debate.status, to, reason).await
    }

    /// Move a debate last seen in `seen` to `to`. The store writes only while
    /// the status is still `seen`; when another decision won in between, the
    /// table is checked again against the status it left behind.
    async fn transition_from(
        &self,
        id: &str,
        mut seen: DebateStatus,
        to: DebateStatus,
        reason: Option<String>,
    ) -> ApiResult<Debate> {
        for _ in 0..MAX_REVIEW_ATTEMPTS {
            if !Self::is_valid_transition(seen, to) {
                tracing::warn!(
                    debate_id = id,
                    from = seen.as_str(),
                    to = to.as_str(),
                    "Refused review transition"
                );
                return Err(ApiError::policy(
                    PolicyKind::InvalidTransition,
                    format!("Cannot move a {} debate to {}", seen.as_str(), to.as_str()),
                ));
            }

            match self
                .store
                .set_debate_status(id, seen, to, reason.clone())
                .await?
            {
                StatusWrite::Applied(updated) => {
                    tracing::info!(
                        debate_id = id,
                        from = seen.as_str(),
                        to = to.as_str(),
                        "Debate reviewed"
                    );
                    return Ok(updated);
                }
                StatusWrite::Conflict(current) => {
                    tracing::debug!(
                        debate_id = id,
                        expected = seen.as_str(),
                        found = current.as_str(),
                        "Debate status changed during review"
                    );
                    seen = current;
                }
                StatusWrite::Missing => return Err(ApiError::NotFound("Debate")),
            }
        }

        Err(ApiError::policy(
            PolicyKind::InvalidTransition,
            "This debate is being reviewed elsewhere, please retry",
        ))
    }

    pub async fn approve(&self, id: &str) -> ApiResult<Debate> {
        self.transition(id, DebateStatus::Approved, None).await
    }

    /// Reject with an optional reason, stored verbatim (empty when absent)
    pub async fn reject(&self, id: &str, reason: Option<String>) -> ApiResult<Debate> {
        self.transition(id, DebateStatus::Rejected, reason).await
    }
}
