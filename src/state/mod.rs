mod debate;
mod draft;
mod review;
mod submission;
mod vote;

pub use debate::{
    AdminOption, CreatedDebate, DebateService, DebateWithOptions, NewDebate, Pagination,
};
pub use draft::{DebateDraft, DraftService};
pub use review::ModerationWorkflow;
pub use submission::{SubmissionPipeline, MAX_OPTION_NAME_CHARS};
pub use vote::{VoteLedger, VoteOutcome, VoteReceipt};

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::config::AppConfig;
use crate::limiter::RateLimiter;
use crate::llm::LlmManager;
use crate::moderation::ModerationGate;
use crate::store::{Store, WindowStore};

/// Shared application state: the pipeline services wired to one store
#[derive(Clone)]
pub struct AppState {
    pub debates: DebateService,
    pub review: ModerationWorkflow,
    pub votes: VoteLedger,
    pub submissions: SubmissionPipeline,
    pub drafts: DraftService,
    pub auth: Arc<AuthConfig>,
    /// Rate-limit windows, for the stale-window sweeper
    pub windows: Arc<dyn WindowStore>,
}

impl AppState {
    /// Wire every service to `store`. Without an LLM the classifier runs
    /// unconfigured and drafting is unavailable.
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        config: &AppConfig,
        llm: Option<LlmManager>,
    ) -> Self {
        let llm = llm.map(Arc::new);
        let shared: Arc<dyn Store> = store.clone();
        let windows: Arc<dyn WindowStore> = store;

        let limiter = RateLimiter::new(windows.clone(), config.limits);
        let gate = ModerationGate::new(
            llm.clone(),
            config.classifier_timeout,
            config.llm.default_max_tokens,
        );

        Self {
            debates: DebateService::new(shared.clone(), gate.clone()),
            review: ModerationWorkflow::new(shared.clone()),
            votes: VoteLedger::new(shared.clone()),
            submissions: SubmissionPipeline::new(shared, limiter.clone(), gate),
            drafts: DraftService::new(
                llm,
                limiter,
                config.llm.default_timeout,
                config.llm.default_max_tokens,
            ),
            auth: Arc::new(config.auth.clone()),
            windows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_services_share_one_store() {
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            &AppConfig::default(),
            None,
        );
        let created = state
            .debates
            .create_debate(NewDebate {
                title: "Tabs or spaces?".to_string(),
                options: vec!["Tabs".to_string(), "Spaces".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        // No classifier: the debate waits for review and cannot be voted on
        assert!(state
            .votes
            .record_vote(&created.debate.id, &created.options[0].id, "fp")
            .await
            .is_err());

        state.review.approve(&created.debate.id).await.unwrap();
        let receipt = state
            .votes
            .record_vote(&created.debate.id, &created.options[0].id, "fp")
            .await
            .unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Recorded);
    }
}
