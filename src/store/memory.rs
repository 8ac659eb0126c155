//! In-process implementation of the store traits.
//!
//! Tables sit behind `tokio::sync::RwLock`s; vote and debate counters are
//! atomics so they can be adjusted under a read lock and read without
//! blocking writers of other records. Votes are sharded per debate, each
//! shard behind its own mutex. Locks are always taken in the order
//! vote shard -> options -> debates, and the shard index is never held while
//! waiting for a shard.

use super::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

struct DebateEntry {
    record: Debate,
    total_votes: AtomicU64,
}

impl DebateEntry {
    fn snapshot(&self) -> Debate {
        Debate {
            total_votes: self.total_votes.load(Ordering::SeqCst),
            ..self.record.clone()
        }
    }
}

struct OptionEntry {
    record: DebateOption,
    votes: AtomicU64,
}

impl OptionEntry {
    fn snapshot(&self) -> DebateOption {
        DebateOption {
            votes: self.votes.load(Ordering::SeqCst),
            ..self.record.clone()
        }
    }
}

#[derive(Default)]
struct DebateTable {
    by_id: HashMap<DebateId, DebateEntry>,
    by_slug: HashMap<String, DebateId>,
}

#[derive(Default)]
struct OptionTable {
    by_id: HashMap<OptionId, OptionEntry>,
    /// (debate id, normalized name) -> option id
    by_name: HashMap<(DebateId, String), OptionId>,
}

/// Votes of one debate, keyed by fingerprint
type VoteShard = Arc<Mutex<HashMap<Fingerprint, Vote>>>;

fn add_one(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::SeqCst);
}

fn sub(counter: &AtomicU64, amount: u64) {
    // Never wraps below zero
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
        Some(v.saturating_sub(amount))
    });
}

fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let total = items.len();
    let page = page.max(1);
    let items = items
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();
    Page { items, total }
}

/// In-memory store shared by all request handlers
#[derive(Default)]
pub struct MemoryStore {
    votes: RwLock<HashMap<DebateId, VoteShard>>,
    options: RwLock<OptionTable>,
    debates: RwLock<DebateTable>,
    windows: RwLock<HashMap<WindowKey, RateLimitWindow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The vote shard of a debate, created on first use
    async fn vote_shard(&self, debate_id: &str) -> VoteShard {
        if let Some(shard) = self.votes.read().await.get(debate_id) {
            return shard.clone();
        }
        self.votes
            .write()
            .await
            .entry(debate_id.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl DebateStore for MemoryStore {
    async fn insert_debate(
        &self,
        debate: Debate,
        options: Vec<DebateOption>,
    ) -> StoreResult<WriteOutcome> {
        let mut option_table = self.options.write().await;
        let mut debates = self.debates.write().await;

        if debates.by_slug.contains_key(&debate.slug) || debates.by_id.contains_key(&debate.id) {
            return Ok(WriteOutcome::Conflict);
        }

        for option in options {
            let key = (debate.id.clone(), option_name_key(&option.name));
            if option_table.by_name.contains_key(&key) {
                continue;
            }
            option_table.by_name.insert(key, option.id.clone());
            option_table.by_id.insert(
                option.id.clone(),
                OptionEntry {
                    votes: AtomicU64::new(0),
                    record: option,
                },
            );
        }

        debates
            .by_slug
            .insert(debate.slug.clone(), debate.id.clone());
        debates.by_id.insert(
            debate.id.clone(),
            DebateEntry {
                total_votes: AtomicU64::new(0),
                record: debate,
            },
        );
        Ok(WriteOutcome::Applied)
    }

    async fn get_debate(&self, id: &str) -> StoreResult<Option<Debate>> {
        Ok(self
            .debates
            .read()
            .await
            .by_id
            .get(id)
            .map(DebateEntry::snapshot))
    }

    async fn get_debate_by_slug(&self, slug: &str) -> StoreResult<Option<Debate>> {
        let debates = self.debates.read().await;
        Ok(debates
            .by_slug
            .get(slug)
            .and_then(|id| debates.by_id.get(id))
            .map(DebateEntry::snapshot))
    }

    async fn list_debates(&self, query: &DebateQuery) -> StoreResult<Page<Debate>> {
        let debates = self.debates.read().await;
        let mut matching: Vec<Debate> = debates
            .by_id
            .values()
            .filter(|e| query.status.is_none_or(|s| e.record.status == s))
            .filter(|e| !query.active_only || e.record.is_active)
            .filter(|e| {
                query
                    .category
                    .as_deref()
                    .is_none_or(|c| e.record.category.eq_ignore_ascii_case(c))
            })
            .map(DebateEntry::snapshot)
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(paginate(matching, query.page, query.limit))
    }

    async fn update_debate(&self, id: &str, patch: DebatePatch) -> StoreResult<Option<Debate>> {
        let mut debates = self.debates.write().await;
        let Some(entry) = debates.by_id.get_mut(id) else {
            return Ok(None);
        };
        let record = &mut entry.record;
        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(category) = patch.category {
            record.category = category;
        }
        if let Some(sub_category) = patch.sub_category {
            record.sub_category = sub_category;
        }
        if let Some(is_active) = patch.is_active {
            record.is_active = is_active;
        }
        if let Some(allowed) = patch.is_more_option_allowed {
            record.is_more_option_allowed = allowed;
        }
        Ok(Some(entry.snapshot()))
    }

    async fn set_debate_status(
        &self,
        id: &str,
        expected: DebateStatus,
        status: DebateStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<StatusWrite> {
        let mut debates = self.debates.write().await;
        let Some(entry) = debates.by_id.get_mut(id) else {
            return Ok(StatusWrite::Missing);
        };
        if entry.record.status != expected {
            return Ok(StatusWrite::Conflict(entry.record.status));
        }
        entry.record.status = status;
        entry.record.rejection_reason = match status {
            DebateStatus::Rejected => Some(rejection_reason.unwrap_or_default()),
            _ => None,
        };
        Ok(StatusWrite::Applied(entry.snapshot()))
    }

    async fn delete_debate(&self, id: &str) -> StoreResult<bool> {
        let mut votes = self.votes.write().await;
        let mut option_table = self.options.write().await;
        let mut debates = self.debates.write().await;

        let Some(entry) = debates.by_id.remove(id) else {
            return Ok(false);
        };
        debates.by_slug.remove(&entry.record.slug);

        votes.remove(id);
        let OptionTable { by_id, by_name } = &mut *option_table;
        by_id.retain(|_, o| o.record.debate_id != id);
        by_name.retain(|(debate_id, _), _| debate_id != id);
        Ok(true)
    }
}

#[async_trait]
impl OptionStore for MemoryStore {
    async fn insert_option(&self, option: DebateOption) -> StoreResult<WriteOutcome> {
        let mut option_table = self.options.write().await;
        let debates = self.debates.read().await;

        let Some(debate) = debates.by_id.get(&option.debate_id) else {
            return Ok(WriteOutcome::Missing);
        };
        if !debate.record.is_more_option_allowed {
            return Ok(WriteOutcome::Closed);
        }
        let key = (option.debate_id.clone(), option_name_key(&option.name));
        if option_table.by_name.contains_key(&key) {
            return Ok(WriteOutcome::Conflict);
        }

        option_table.by_name.insert(key, option.id.clone());
        option_table.by_id.insert(
            option.id.clone(),
            OptionEntry {
                votes: AtomicU64::new(0),
                record: DebateOption { votes: 0, ..option },
            },
        );
        Ok(WriteOutcome::Applied)
    }

    async fn get_option(&self, id: &str) -> StoreResult<Option<DebateOption>> {
        Ok(self
            .options
            .read()
            .await
            .by_id
            .get(id)
            .map(OptionEntry::snapshot))
    }

    async fn find_option_by_name(
        &self,
        debate_id: &str,
        name: &str,
    ) -> StoreResult<Option<DebateOption>> {
        let option_table = self.options.read().await;
        let key = (debate_id.to_string(), option_name_key(name));
        Ok(option_table
            .by_name
            .get(&key)
            .and_then(|id| option_table.by_id.get(id))
            .map(OptionEntry::snapshot))
    }

    async fn list_options(&self, debate_id: &str) -> StoreResult<Vec<DebateOption>> {
        let mut options: Vec<DebateOption> = self
            .options
            .read()
            .await
            .by_id
            .values()
            .filter(|o| o.record.debate_id == debate_id)
            .map(OptionEntry::snapshot)
            .collect();
        options.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(options)
    }

    async fn list_all_options(&self, query: &OptionQuery) -> StoreResult<Page<DebateOption>> {
        let mut options: Vec<DebateOption> = self
            .options
            .read()
            .await
            .by_id
            .values()
            .filter(|o| {
                query
                    .debate_id
                    .as_deref()
                    .is_none_or(|d| o.record.debate_id == d)
            })
            .map(OptionEntry::snapshot)
            .collect();
        options.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(paginate(options, query.page, query.limit))
    }

    async fn delete_option(&self, id: &str) -> StoreResult<bool> {
        let owner = self
            .options
            .read()
            .await
            .by_id
            .get(id)
            .map(|o| o.record.debate_id.clone());
        let Some(debate_id) = owner else {
            return Ok(false);
        };

        let shard = self.vote_shard(&debate_id).await;
        let mut votes = shard.lock().await;
        let mut option_table = self.options.write().await;
        let debates = self.debates.read().await;

        // Another delete may have won while the options lock was released
        let Some(entry) = option_table.by_id.remove(id) else {
            return Ok(false);
        };
        option_table
            .by_name
            .remove(&(debate_id.clone(), option_name_key(&entry.record.name)));

        let before = votes.len();
        votes.retain(|_, v| v.option_id != id);
        let removed = (before - votes.len()) as u64;

        if let Some(debate) = debates.by_id.get(&debate_id) {
            sub(&debate.total_votes, removed);
        }
        Ok(true)
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn get_vote(&self, fingerprint: &str, debate_id: &str) -> StoreResult<Option<Vote>> {
        let shard = self.votes.read().await.get(debate_id).cloned();
        let Some(shard) = shard else {
            return Ok(None);
        };
        let vote = shard.lock().await.get(fingerprint).cloned();
        Ok(vote)
    }

    async fn insert_vote(&self, vote: Vote) -> StoreResult<WriteOutcome> {
        let shard = self.vote_shard(&vote.debate_id).await;
        let mut votes = shard.lock().await;
        if votes.contains_key(&vote.fingerprint) {
            return Ok(WriteOutcome::Conflict);
        }

        let option_table = self.options.read().await;
        let debates = self.debates.read().await;
        let (Some(option), Some(debate)) = (
            option_table.by_id.get(&vote.option_id),
            debates.by_id.get(&vote.debate_id),
        ) else {
            return Ok(WriteOutcome::Missing);
        };
        if option.record.debate_id != vote.debate_id {
            return Ok(WriteOutcome::Missing);
        }
        // Checked under the debates lock so a concurrent review or
        // deactivation is ordered before or after this vote
        if !debate.record.is_votable() {
            return Ok(WriteOutcome::Closed);
        }

        add_one(&option.votes);
        add_one(&debate.total_votes);
        votes.insert(vote.fingerprint.clone(), vote);
        Ok(WriteOutcome::Applied)
    }

    async fn swap_vote(
        &self,
        fingerprint: &str,
        debate_id: &str,
        expected: &str,
        next: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let shard = self.vote_shard(debate_id).await;
        let mut votes = shard.lock().await;
        let Some(vote) = votes.get_mut(fingerprint) else {
            return Ok(WriteOutcome::Conflict);
        };
        if vote.option_id != expected {
            return Ok(WriteOutcome::Conflict);
        }

        let option_table = self.options.read().await;
        let debates = self.debates.read().await;
        let (Some(next_option), Some(debate)) = (
            option_table
                .by_id
                .get(next)
                .filter(|o| o.record.debate_id == debate_id),
            debates.by_id.get(debate_id),
        ) else {
            return Ok(WriteOutcome::Missing);
        };
        if !debate.record.is_votable() {
            return Ok(WriteOutcome::Closed);
        }

        if let Some(previous) = option_table.by_id.get(expected) {
            sub(&previous.votes, 1);
        }
        add_one(&next_option.votes);
        vote.option_id = next.to_string();
        vote.updated_at = at;
        Ok(WriteOutcome::Applied)
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn get_window(&self, key: &WindowKey) -> StoreResult<Option<RateLimitWindow>> {
        Ok(self.windows.read().await.get(key).cloned())
    }

    async fn increment_window(&self, key: &WindowKey, at: DateTime<Utc>) -> StoreResult<u32> {
        let mut windows = self.windows.write().await;
        let window = windows
            .entry(key.clone())
            .or_insert_with(|| RateLimitWindow {
                key: key.clone(),
                count: 0,
                last_request: at,
            });
        window.count = window.count.saturating_add(1);
        window.last_request = at;
        Ok(window.count)
    }

    async fn increment_window_below(
        &self,
        key: &WindowKey,
        limit: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        let mut windows = self.windows.write().await;
        match windows.get_mut(key) {
            Some(window) if window.count >= limit => Ok(None),
            Some(window) => {
                window.count += 1;
                window.last_request = at;
                Ok(Some(window.count))
            }
            None if limit == 0 => Ok(None),
            None => {
                windows.insert(
                    key.clone(),
                    RateLimitWindow {
                        key: key.clone(),
                        count: 1,
                        last_request: at,
                    },
                );
                Ok(Some(1))
            }
        }
    }

    async fn prune_windows(&self, day: NaiveDate) -> StoreResult<usize> {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|key, _| key.day >= day);
        Ok(before - windows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn debate(id: &str, slug: &str) -> Debate {
        Debate {
            id: id.to_string(),
            slug: slug.to_string(),
            title: format!("Debate {}", id),
            description: None,
            category: "Technology".to_string(),
            sub_category: None,
            tags: vec![],
            status: DebateStatus::Approved,
            rejection_reason: None,
            is_active: true,
            is_more_option_allowed: true,
            total_votes: 0,
            created_at: Utc::now(),
        }
    }

    fn option(id: &str, debate_id: &str, name: &str) -> DebateOption {
        DebateOption {
            id: id.to_string(),
            debate_id: debate_id.to_string(),
            name: name.to_string(),
            votes: 0,
            created_at: Utc::now(),
        }
    }

    fn vote(fingerprint: &str, debate_id: &str, option_id: &str) -> Vote {
        Vote {
            id: ulid::Ulid::new().to_string(),
            debate_id: debate_id.to_string(),
            fingerprint: fingerprint.to_string(),
            option_id: option_id.to_string(),
            updated_at: Utc::now(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_debate(
                debate("d1", "best-phone"),
                vec![option("o1", "d1", "Apple"), option("o2", "d1", "Samsung")],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_slug_is_unique() {
        let store = seeded().await;
        let outcome = store
            .insert_debate(debate("d2", "best-phone"), vec![])
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
        assert!(store.get_debate("d2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_option_name_unique_per_debate() {
        let store = seeded().await;
        assert_eq!(
            store.insert_option(option("o3", "d1", " apple ")).await.unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(
            store.insert_option(option("o4", "nope", "Pixel")).await.unwrap(),
            WriteOutcome::Missing
        );
        assert_eq!(
            store.insert_option(option("o5", "d1", "Pixel")).await.unwrap(),
            WriteOutcome::Applied
        );
        let found = store.find_option_by_name("d1", "PIXEL").await.unwrap();
        assert_eq!(found.map(|o| o.id), Some("o5".to_string()));
    }

    #[tokio::test]
    async fn test_insert_vote_counts_once() {
        let store = seeded().await;
        assert_eq!(
            store.insert_vote(vote("fp", "d1", "o1")).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.insert_vote(vote("fp", "d1", "o2")).await.unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(store.get_option("o1").await.unwrap().unwrap().votes, 1);
        assert_eq!(store.get_option("o2").await.unwrap().unwrap().votes, 0);
        assert_eq!(store.get_debate("d1").await.unwrap().unwrap().total_votes, 1);
    }

    #[tokio::test]
    async fn test_swap_vote_is_compare_and_set() {
        let store = seeded().await;
        store.insert_vote(vote("fp", "d1", "o1")).await.unwrap();

        let stale = store
            .swap_vote("fp", "d1", "o2", "o1", Utc::now())
            .await
            .unwrap();
        assert_eq!(stale, WriteOutcome::Conflict);

        let moved = store
            .swap_vote("fp", "d1", "o1", "o2", Utc::now())
            .await
            .unwrap();
        assert_eq!(moved, WriteOutcome::Applied);
        assert_eq!(store.get_option("o1").await.unwrap().unwrap().votes, 0);
        assert_eq!(store.get_option("o2").await.unwrap().unwrap().votes, 1);
        assert_eq!(store.get_debate("d1").await.unwrap().unwrap().total_votes, 1);
    }

    #[tokio::test]
    async fn test_delete_option_keeps_total_consistent() {
        let store = seeded().await;
        store.insert_vote(vote("a", "d1", "o1")).await.unwrap();
        store.insert_vote(vote("b", "d1", "o1")).await.unwrap();
        store.insert_vote(vote("c", "d1", "o2")).await.unwrap();

        assert!(store.delete_option("o1").await.unwrap());
        assert_eq!(store.get_debate("d1").await.unwrap().unwrap().total_votes, 1);
        assert!(store.get_vote("a", "d1").await.unwrap().is_none());
        assert!(store.get_vote("c", "d1").await.unwrap().is_some());
        // name is free again
        assert_eq!(
            store.insert_option(option("o9", "d1", "apple")).await.unwrap(),
            WriteOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_delete_debate_cascades() {
        let store = seeded().await;
        store.insert_vote(vote("a", "d1", "o1")).await.unwrap();

        assert!(store.delete_debate("d1").await.unwrap());
        assert!(store.get_option("o1").await.unwrap().is_none());
        assert!(store.get_vote("a", "d1").await.unwrap().is_none());
        assert!(store.get_debate_by_slug("best-phone").await.unwrap().is_none());
        assert!(!store.delete_debate("d1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_votes_on_one_option() {
        let store = Arc::new(seeded().await);
        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert_vote(vote(&format!("fp{}", i), "d1", "o1"))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), WriteOutcome::Applied);
        }
        assert_eq!(store.get_option("o1").await.unwrap().unwrap().votes, 50);
        assert_eq!(store.get_debate("d1").await.unwrap().unwrap().total_votes, 50);
    }

    #[tokio::test]
    async fn test_window_increment_below_limit() {
        let store = MemoryStore::new();
        let key = WindowKey {
            identity: "abc".to_string(),
            day: Utc::now().date_naive(),
            action: ActionClass::DraftGeneration,
        };
        for expected in 1..=3 {
            assert_eq!(
                store.increment_window_below(&key, 3, Utc::now()).await.unwrap(),
                Some(expected)
            );
        }
        assert_eq!(
            store.increment_window_below(&key, 3, Utc::now()).await.unwrap(),
            None
        );
        assert_eq!(store.get_window(&key).await.unwrap().unwrap().count, 3);
    }

    #[tokio::test]
    async fn test_prune_windows_drops_past_days() {
        let store = MemoryStore::new();
        let today = Utc::now().date_naive();
        let yesterday = today.pred_opt().unwrap();
        for day in [yesterday, today] {
            let key = WindowKey {
                identity: "abc".to_string(),
                day,
                action: ActionClass::OptionCreation,
            };
            store.increment_window(&key, Utc::now()).await.unwrap();
        }
        assert_eq!(store.prune_windows(today).await.unwrap(), 1);
        assert_eq!(store.prune_windows(today).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_debates_filters_and_pages() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut d = debate(&format!("d{}", i), &format!("slug-{}", i));
            d.status = if i % 2 == 0 {
                DebateStatus::Approved
            } else {
                DebateStatus::Pending
            };
            store.insert_debate(d, vec![]).await.unwrap();
        }
        let page = store
            .list_debates(&DebateQuery {
                status: Some(DebateStatus::Approved),
                category: None,
                active_only: false,
                page: 1,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|d| d.status == DebateStatus::Approved));
    }

    #[tokio::test]
    async fn test_set_debate_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let mut pending = debate("d1", "best-phone");
        pending.status = DebateStatus::Pending;
        store.insert_debate(pending, vec![]).await.unwrap();

        let approved = store
            .set_debate_status("d1", DebateStatus::Pending, DebateStatus::Approved, None)
            .await
            .unwrap();
        assert!(matches!(approved, StatusWrite::Applied(ref d) if d.status == DebateStatus::Approved));

        // A second decision made on the stale pending snapshot loses
        let stale = store
            .set_debate_status(
                "d1",
                DebateStatus::Pending,
                DebateStatus::Rejected,
                Some("spam".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(stale, StatusWrite::Conflict(DebateStatus::Approved));
        let stored = store.get_debate("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DebateStatus::Approved);
        assert_eq!(stored.rejection_reason, None);

        let missing = store
            .set_debate_status("nope", DebateStatus::Pending, DebateStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(missing, StatusWrite::Missing);
    }

    #[tokio::test]
    async fn test_votes_refused_once_debate_closes() {
        let store = seeded().await;
        store.insert_vote(vote("a", "d1", "o1")).await.unwrap();
        store
            .update_debate(
                "d1",
                DebatePatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store.insert_vote(vote("b", "d1", "o1")).await.unwrap(),
            WriteOutcome::Closed
        );
        assert_eq!(
            store
                .swap_vote("a", "d1", "o1", "o2", Utc::now())
                .await
                .unwrap(),
            WriteOutcome::Closed
        );
        assert_eq!(store.get_option("o1").await.unwrap().unwrap().votes, 1);
        assert_eq!(store.get_option("o2").await.unwrap().unwrap().votes, 0);
        assert_eq!(store.get_debate("d1").await.unwrap().unwrap().total_votes, 1);

        store
            .set_debate_status("d1", DebateStatus::Approved, DebateStatus::Rejected, None)
            .await
            .unwrap();
        store
            .update_debate(
                "d1",
                DebatePatch {
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.insert_vote(vote("b", "d1", "o1")).await.unwrap(),
            WriteOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_locked_debate_refuses_new_options() {
        let store = seeded().await;
        store
            .update_debate(
                "d1",
                DebatePatch {
                    is_more_option_allowed: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.insert_option(option("o3", "d1", "Pixel")).await.unwrap(),
            WriteOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_votes_on_other_debates_do_not_wait() {
        let store = seeded().await;
        store
            .insert_debate(
                debate("d2", "best-laptop"),
                vec![option("o3", "d2", "ThinkPad")],
            )
            .await
            .unwrap();

        // A writer parked inside the first debate's shard
        let shard = store.vote_shard("d1").await;
        let _held = shard.lock().await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            store.insert_vote(vote("fp", "d2", "o3")),
        )
        .await
        .expect("vote on another debate was blocked")
        .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(store.get_debate("d2").await.unwrap().unwrap().total_votes, 1);
    }
}
