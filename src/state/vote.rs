use std::sync::Arc;

use crate::error::{ApiError, ApiResult, PolicyKind};
use crate::store::{DebateStore, OptionStore, Store, WriteOutcome};
use crate::types::*;

/// Attempts before giving up on a voter whose record keeps changing under us
const MAX_VOTE_ATTEMPTS: usize = 8;

fn debate_closed() -> ApiError {
    ApiError::policy(PolicyKind::DebateClosed, "This debate is not open for voting")
}

/// What a vote request did to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote of this voter in this debate
    Recorded,
    /// The voter moved their vote away from `previous`
    Changed { previous: OptionId },
    /// The voter already chose this option; nothing moved
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub outcome: VoteOutcome,
    pub current_option_id: OptionId,
}

impl VoteReceipt {
    pub fn changed(&self) -> bool {
        matches!(self.outcome, VoteOutcome::Changed { .. })
    }

    pub fn unchanged(&self) -> bool {
        self.outcome == VoteOutcome::Unchanged
    }
}

/// Authoritative record of each voter's current choice per debate
#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<dyn Store>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record, move or re-assert a voter's choice.
    ///
    /// The read-decide-write sequence is retried until the store accepts a
    /// uniqueness-checked insert or a compare-and-set, so two concurrent
    /// requests of one voter can never both count as a first vote.
    pub async fn record_vote(
        &self,
        debate_id: &str,
        option_id: &str,
        fingerprint: &str,
    ) -> ApiResult<VoteReceipt> {
        let (debate_id, option_id, fingerprint) =
            (debate_id.trim(), option_id.trim(), fingerprint.trim());
        if debate_id.is_empty() || option_id.is_empty() || fingerprint.is_empty() {
            return Err(ApiError::Validation("Missing required fields".to_string()));
        }

        let debate = self
            .store
            .get_debate(debate_id)
            .await?
            .ok_or(ApiError::NotFound("Debate"))?;
        if !debate.is_votable() {
            return Err(debate_closed());
        }

        let option = self
            .store
            .get_option(option_id)
            .await?
            .filter(|o| o.debate_id == debate.id)
            .ok_or(ApiError::NotFound("Option"))?;

        let receipt = |outcome| VoteReceipt {
            outcome,
            current_option_id: option.id.clone(),
        };

        for attempt in 1..=MAX_VOTE_ATTEMPTS {
            let existing = self.store.get_vote(fingerprint, &debate.id).await?;

            let written = match &existing {
                None => {
                    let vote = Vote {
                        id: ulid::Ulid::new().to_string(),
                        debate_id: debate.id.clone(),
                        fingerprint: fingerprint.to_string(),
                        option_id: option.id.clone(),
                        updated_at: chrono::Utc::now(),
                    };
                    self.store.insert_vote(vote).await?
                }
                Some(vote) if vote.option_id == option.id => {
                    tracing::debug!(debate_id = %debate.id, "Vote re-asserted, nothing to do");
                    return Ok(receipt(VoteOutcome::Unchanged));
                }
                Some(vote) => {
                    self.store
                        .swap_vote(
                            fingerprint,
                            &debate.id,
                            &vote.option_id,
                            &option.id,
                            chrono::Utc::now(),
                        )
                        .await?
                }
            };

            match written {
                WriteOutcome::Applied => {
                    let outcome = match existing {
                        None => VoteOutcome::Recorded,
                        Some(vote) => VoteOutcome::Changed {
                            previous: vote.option_id,
                        },
                    };
                    tracing::info!(
                        debate_id = %debate.id,
                        option_id = %option.id,
                        outcome = ?outcome,
                        "Vote applied"
                    );
                    return Ok(receipt(outcome));
                }
                // The option vanished between lookup and write
                WriteOutcome::Missing => return Err(ApiError::NotFound("Option")),
                // Rejected or deactivated after the check above
                WriteOutcome::Closed => return Err(debate_closed()),
                WriteOutcome::Conflict => {
                    tracing::debug!(attempt, "Concurrent vote by the same voter, retrying");
                }
            }
        }

        tracing::warn!(debate_id = %debate.id, "Gave up recording a contended vote");
        Err(ApiError::Contended(
            "Your vote is being updated elsewhere, please retry".to_string(),
        ))
    }

    /// The voter's current choice, used to reconcile the client's local marker
    pub async fn current_choice(
        &self,
        debate_id: &str,
        fingerprint: &str,
    ) -> ApiResult<Option<OptionId>> {
        if fingerprint.trim().is_empty() {
            return Err(ApiError::Validation("Missing fingerprint".to_string()));
        }
        Ok(self
            .store
            .get_vote(fingerprint.trim(), debate_id)
            .await?
            .map(|v| v.option_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn debate(status: DebateStatus, is_active: bool) -> Debate {
        Debate {
            id: "d1".to_string(),
            slug: "best-pet".to_string(),
            title: "Best pet?".to_string(),
            description: None,
            category: "Pets".to_string(),
            sub_category: None,
            tags: vec![],
            status,
            rejection_reason: None,
            is_active,
            is_more_option_allowed: true,
            total_votes: 0,
            created_at: Utc::now(),
        }
    }

    fn option(id: &str, name: &str) -> DebateOption {
        DebateOption {
            id: id.to_string(),
            debate_id: "d1".to_string(),
            name: name.to_string(),
            votes: 0,
            created_at: Utc::now(),
        }
    }

    async fn ledger_with(debate: Debate) -> (VoteLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_debate(
                debate,
                vec![option("cats", "Cats"), option("dogs", "Dogs")],
            )
            .await
            .unwrap();
        (VoteLedger::new(store.clone()), store)
    }

    async fn counts(store: &MemoryStore) -> (u64, u64, u64) {
        let cats = store.get_option("cats").await.unwrap().unwrap().votes;
        let dogs = store.get_option("dogs").await.unwrap().unwrap().votes;
        let total = store.get_debate("d1").await.unwrap().unwrap().total_votes;
        (cats, dogs, total)
    }

    #[tokio::test]
    async fn test_first_vote_counts() {
        let (ledger, store) = ledger_with(debate(DebateStatus::Approved, true)).await;
        let receipt = ledger.record_vote("d1", "cats", "fp1").await.unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Recorded);
        assert!(!receipt.changed());
        assert_eq!(counts(&store).await, (1, 0, 1));
    }

    #[tokio::test]
    async fn test_same_option_twice_is_a_no_op() {
        let (ledger, store) = ledger_with(debate(DebateStatus::Approved, true)).await;
        ledger.record_vote("d1", "cats", "fp1").await.unwrap();
        let again = ledger.record_vote("d1", "cats", "fp1").await.unwrap();
        assert!(again.unchanged());
        assert!(!again.changed());
        assert_eq!(counts(&store).await, (1, 0, 1));
    }

    #[tokio::test]
    async fn test_switching_moves_one_vote() {
        let (ledger, store) = ledger_with(debate(DebateStatus::Approved, true)).await;
        ledger.record_vote("d1", "cats", "fp1").await.unwrap();
        ledger.record_vote("d1", "cats", "fp2").await.unwrap();

        let switched = ledger.record_vote("d1", "dogs", "fp1").await.unwrap();
        assert_eq!(
            switched.outcome,
            VoteOutcome::Changed {
                previous: "cats".to_string()
            }
        );
        assert_eq!(switched.current_option_id, "dogs");
        assert_eq!(counts(&store).await, (1, 1, 2));
        assert_eq!(
            ledger.current_choice("d1", "fp1").await.unwrap().as_deref(),
            Some("dogs")
        );
    }

    #[tokio::test]
    async fn test_closed_debates_refuse_votes() {
        for (status, active) in [
            (DebateStatus::Pending, true),
            (DebateStatus::Rejected, true),
            (DebateStatus::Approved, false),
        ] {
            let (ledger, store) = ledger_with(debate(status, active)).await;
            let err = ledger.record_vote("d1", "cats", "fp1").await.unwrap_err();
            assert!(matches!(
                err,
                ApiError::Policy {
                    kind: PolicyKind::DebateClosed,
                    ..
                }
            ));
            assert_eq!(counts(&store).await, (0, 0, 0));
        }
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_option_is_not_found() {
        let (ledger, store) = ledger_with(debate(DebateStatus::Approved, true)).await;
        let mut other = debate(DebateStatus::Approved, true);
        other.id = "d2".to_string();
        other.slug = "other".to_string();
        store
            .insert_debate(
                other,
                vec![DebateOption {
                    debate_id: "d2".to_string(),
                    ..option("fish", "Fish")
                }],
            )
            .await
            .unwrap();

        let err = ledger.record_vote("d1", "nope", "fp1").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Option")));
        let err = ledger.record_vote("d1", "fish", "fp1").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Option")));
        let err = ledger.record_vote("d9", "cats", "fp1").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Debate")));
    }

    #[tokio::test]
    async fn test_missing_fields_are_validation_errors() {
        let (ledger, _) = ledger_with(debate(DebateStatus::Approved, true)).await;
        let err = ledger.record_vote("d1", "cats", "  ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_of_one_voter_count_once() {
        let (ledger, store) = ledger_with(debate(DebateStatus::Approved, true)).await;
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let ledger = ledger.clone();
                let option = if i % 2 == 0 { "cats" } else { "dogs" };
                tokio::spawn(async move { ledger.record_vote("d1", option, "fp1").await })
            })
            .collect();
        let mut firsts = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().outcome == VoteOutcome::Recorded {
                firsts += 1;
            }
        }
        assert_eq!(firsts, 1);
        let (cats, dogs, total) = counts(&store).await;
        assert_eq!(total, 1);
        assert_eq!(cats + dogs, 1);
    }

    #[tokio::test]
    async fn test_sum_of_options_matches_total_after_many_moves() {
        let (ledger, store) = ledger_with(debate(DebateStatus::Approved, true)).await;
        let script = [
            ("a", "cats"),
            ("b", "dogs"),
            ("a", "dogs"),
            ("c", "cats"),
            ("a", "cats"),
            ("b", "dogs"),
            ("c", "dogs"),
        ];
        for (fingerprint, option) in script {
            ledger.record_vote("d1", option, fingerprint).await.unwrap();
            let (cats, dogs, total) = counts(&store).await;
            assert_eq!(cats + dogs, total);
        }
        assert_eq!(counts(&store).await, (1, 2, 3));
    }
}
