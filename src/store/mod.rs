//! Persistence primitives the pipeline is built on.
//!
//! All serialization requirements live here: uniqueness-checked inserts,
//! compare-and-set on a voter's choice, atomic counter deltas and
//! upsert-increments of rate-limit windows. Request handlers never hold a
//! lock of their own.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::*;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a write guarded by a uniqueness constraint or compare-and-set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The uniqueness constraint or the expected value did not hold
    Conflict,
    /// A record the write depends on no longer exists
    Missing,
    /// The parent debate no longer accepts this kind of write
    Closed,
}

/// Outcome of a compare-and-set on a debate's review status
#[derive(Debug, Clone, PartialEq)]
pub enum StatusWrite {
    Applied(Debate),
    /// The stored status was not the expected one; carries the actual status
    Conflict(DebateStatus),
    Missing,
}

/// One page of a listing plus the unpaginated total
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct DebateQuery {
    pub status: Option<DebateStatus>,
    pub category: Option<String>,
    /// Only debates with `is_active == true`
    pub active_only: bool,
    /// 1-based
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct OptionQuery {
    pub debate_id: Option<DebateId>,
    pub page: usize,
    pub limit: usize,
}

/// Administrative field edits; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct DebatePatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub sub_category: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_more_option_allowed: Option<bool>,
}

/// Uniqueness key of an option name within its debate
pub fn option_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[async_trait]
pub trait DebateStore: Send + Sync {
    /// Insert a debate together with its initial options. `Conflict` when the
    /// slug is taken.
    async fn insert_debate(
        &self,
        debate: Debate,
        options: Vec<DebateOption>,
    ) -> StoreResult<WriteOutcome>;

    async fn get_debate(&self, id: &str) -> StoreResult<Option<Debate>>;

    async fn get_debate_by_slug(&self, slug: &str) -> StoreResult<Option<Debate>>;

    /// Newest first
    async fn list_debates(&self, query: &DebateQuery) -> StoreResult<Page<Debate>>;

    async fn update_debate(&self, id: &str, patch: DebatePatch) -> StoreResult<Option<Debate>>;

    /// Compare-and-set the review status from `expected` to `status`. The
    /// reason is stored only for rejections.
    async fn set_debate_status(
        &self,
        id: &str,
        expected: DebateStatus,
        status: DebateStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<StatusWrite>;

    /// Removes the debate, its options and its votes
    async fn delete_debate(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait OptionStore: Send + Sync {
    /// Insert under the `(debate_id, lowercased name)` constraint.
    /// `Missing` when the debate is gone, `Closed` when it takes no more
    /// options.
    async fn insert_option(&self, option: DebateOption) -> StoreResult<WriteOutcome>;

    async fn get_option(&self, id: &str) -> StoreResult<Option<DebateOption>>;

    /// Case-insensitive exact match on the trimmed name
    async fn find_option_by_name(
        &self,
        debate_id: &str,
        name: &str,
    ) -> StoreResult<Option<DebateOption>>;

    /// Options of a debate, most votes first
    async fn list_options(&self, debate_id: &str) -> StoreResult<Vec<DebateOption>>;

    /// Newest first
    async fn list_all_options(&self, query: &OptionQuery) -> StoreResult<Page<DebateOption>>;

    /// Removes the option and the votes pointing at it, subtracting those
    /// votes from the debate total
    async fn delete_option(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn get_vote(&self, fingerprint: &str, debate_id: &str) -> StoreResult<Option<Vote>>;

    /// Insert a first vote under the `(fingerprint, debate_id)` constraint and
    /// add one to the option and the debate total. `Closed` when the debate
    /// is not open for voting.
    async fn insert_vote(&self, vote: Vote) -> StoreResult<WriteOutcome>;

    /// Compare-and-set the chosen option from `expected` to `next`, moving one
    /// vote between the two counters. The debate total is untouched. `Closed`
    /// when the debate is not open for voting.
    async fn swap_vote(
        &self,
        fingerprint: &str,
        debate_id: &str,
        expected: &str,
        next: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome>;
}

#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn get_window(&self, key: &WindowKey) -> StoreResult<Option<RateLimitWindow>>;

    /// Upsert-increment; returns the new count
    async fn increment_window(&self, key: &WindowKey, at: DateTime<Utc>) -> StoreResult<u32>;

    /// Increment only while the count is below `limit`; `None` when denied
    async fn increment_window_below(
        &self,
        key: &WindowKey,
        limit: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<u32>>;

    /// Drop windows of days before `day`; returns how many were removed
    async fn prune_windows(&self, day: NaiveDate) -> StoreResult<usize>;
}

/// Everything the service persists
pub trait Store: DebateStore + OptionStore + VoteStore + WindowStore {}

impl<T> Store for T where T: DebateStore + OptionStore + VoteStore + WindowStore {}
