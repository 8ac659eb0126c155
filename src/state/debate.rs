use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::moderation::{DebateSubject, ModerationGate};
use crate::store::{
    option_name_key, DebatePatch, DebateQuery, DebateStore, OptionQuery, Page, Store, WriteOutcome,
};
use crate::types::*;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DEBATE_OPTIONS: usize = 20;
const MIN_DEBATE_OPTIONS: usize = 2;

/// Lowercase alphanumerics only, so suffixes stay readable in URLs
const SLUG_SUFFIX_CHARS: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const SLUG_SUFFIX_LENGTH: usize = 5;
const MAX_SLUG_BASE_CHARS: usize = 60;
const MAX_SLUG_ATTEMPTS: usize = 5;

/// Requested page of a listing, already clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Pagination {
    pub const MAX_LIMIT: usize = 100;

    pub fn new(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.limit)
    }
}

/// A debate draft as submitted by a visitor
#[derive(Debug, Clone, Default)]
pub struct NewDebate {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub options: Vec<String>,
    pub is_more_option_allowed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateWithOptions {
    #[serde(flatten)]
    pub debate: Debate,
    pub options: Vec<DebateOption>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDebate {
    #[serde(flatten)]
    pub debate: Debate,
    pub options: Vec<DebateOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_category: Option<String>,
}

/// An option listed for administrators, with its debate attached
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOption {
    #[serde(flatten)]
    pub option: DebateOption,
    pub debate_title: String,
    pub debate_slug: String,
}

/// Lowercase, hyphen-separated rendering of a title
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_BASE_CHARS {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "debate".to_string()
    } else {
        slug.to_string()
    }
}

fn generate_slug(title: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SLUG_SUFFIX_LENGTH)
        .map(|_| SLUG_SUFFIX_CHARS[rng.random_range(0..SLUG_SUFFIX_CHARS.len())] as char)
        .collect();
    format!("{}-{}", slugify(title), suffix)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_title(title: &str) -> ApiResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::Validation(format!(
            "Titles are limited to {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

/// Trim names, drop blanks and refuse case-insensitive repeats
fn validate_option_names(names: &[String]) -> ApiResult<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let mut cleaned = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if name.chars().count() > super::submission::MAX_OPTION_NAME_CHARS {
            return Err(ApiError::Validation(format!(
                "Option names are limited to {} characters",
                super::submission::MAX_OPTION_NAME_CHARS
            )));
        }
        if !seen.insert(option_name_key(name)) {
            return Err(ApiError::Validation(format!(
                "Option \"{}\" is listed more than once",
                name
            )));
        }
        cleaned.push(name.to_string());
    }
    if cleaned.len() < MIN_DEBATE_OPTIONS {
        return Err(ApiError::Validation(
            "At least two options are required".to_string(),
        ));
    }
    if cleaned.len() > MAX_DEBATE_OPTIONS {
        return Err(ApiError::Validation(format!(
            "A debate can start with at most {} options",
            MAX_DEBATE_OPTIONS
        )));
    }
    Ok(cleaned)
}

/// Debate creation, public reads and administrative edits
#[derive(Clone)]
pub struct DebateService {
    store: Arc<dyn Store>,
    gate: ModerationGate,
}

impl DebateService {
    pub fn new(store: Arc<dyn Store>, gate: ModerationGate) -> Self {
        Self { store, gate }
    }

    /// Create a debate. The classifier decides between `approved` and
    /// `pending`; an unavailable classifier leaves it pending.
    pub async fn create_debate(&self, draft: NewDebate) -> ApiResult<CreatedDebate> {
        let title = validate_title(&draft.title)?;
        let names = validate_option_names(&draft.options)?;
        let description = non_empty(draft.description);

        let verdict = self
            .gate
            .classify_debate(&DebateSubject {
                title: &title,
                description: description.as_deref(),
                options: &names,
            })
            .await;

        let category = non_empty(draft.category)
            .as_deref()
            .and_then(canonical_category)
            .or_else(|| {
                verdict
                    .predicted_category
                    .as_deref()
                    .and_then(canonical_category)
            })
            .unwrap_or(FALLBACK_CATEGORY)
            .to_string();

        let now = chrono::Utc::now();
        let id = ulid::Ulid::new().to_string();
        let options: Vec<DebateOption> = names
            .into_iter()
            .map(|name| DebateOption {
                id: ulid::Ulid::new().to_string(),
                debate_id: id.clone(),
                name,
                votes: 0,
                created_at: now,
            })
            .collect();

        let mut debate = Debate {
            id,
            slug: String::new(),
            title,
            description,
            category,
            sub_category: non_empty(draft.sub_category),
            tags: verdict.tags.clone(),
            status: verdict.status,
            rejection_reason: None,
            is_active: true,
            is_more_option_allowed: draft.is_more_option_allowed.unwrap_or(true),
            total_votes: 0,
            created_at: now,
        };

        // Slugs are random-suffixed; a collision just means drawing again
        let mut stored = false;
        for _ in 0..MAX_SLUG_ATTEMPTS {
            debate.slug = generate_slug(&debate.title);
            match self
                .store
                .insert_debate(debate.clone(), options.clone())
                .await?
            {
                WriteOutcome::Applied => {
                    stored = true;
                    break;
                }
                WriteOutcome::Conflict | WriteOutcome::Missing | WriteOutcome::Closed => {
                    tracing::debug!(slug = %debate.slug, "Slug taken, drawing another");
                }
            }
        }
        if !stored {
            tracing::error!(title = %debate.title, "Could not allocate a unique slug");
            return Err(ApiError::SlugExhausted);
        }

        tracing::info!(
            debate_id = %debate.id,
            slug = %debate.slug,
            status = debate.status.as_str(),
            category = %debate.category,
            classifier_fallback = verdict.fallback,
            "Debate created"
        );

        Ok(CreatedDebate {
            debate,
            options,
            predicted_category: verdict.predicted_category,
        })
    }

    /// Approved and active debates, newest first
    pub async fn list_public(
        &self,
        category: Option<String>,
        pagination: Pagination,
    ) -> ApiResult<Page<Debate>> {
        Ok(self
            .store
            .list_debates(&DebateQuery {
                status: Some(DebateStatus::Approved),
                category: non_empty(category),
                active_only: true,
                page: pagination.page,
                limit: pagination.limit,
            })
            .await?)
    }

    /// A votable debate by slug; anything else is hidden from the public
    pub async fn get_public(&self, slug: &str) -> ApiResult<DebateWithOptions> {
        let debate = self
            .store
            .get_debate_by_slug(slug)
            .await?
            .filter(Debate::is_votable)
            .ok_or(ApiError::NotFound("Debate"))?;
        let options = self.store.list_options(&debate.id).await?;
        Ok(DebateWithOptions { debate, options })
    }

    pub async fn list_admin(
        &self,
        status: Option<DebateStatus>,
        pagination: Pagination,
    ) -> ApiResult<Page<Debate>> {
        Ok(self
            .store
            .list_debates(&DebateQuery {
                status,
                category: None,
                active_only: false,
                page: pagination.page,
                limit: pagination.limit,
            })
            .await?)
    }

    pub async fn get_admin(&self, id: &str) -> ApiResult<DebateWithOptions> {
        let debate = self
            .store
            .get_debate(id)
            .await?
            .ok_or(ApiError::NotFound("Debate"))?;
        let options = self.store.list_options(&debate.id).await?;
        Ok(DebateWithOptions { debate, options })
    }

    /// Edit fields other than slug and status
    pub async fn update(&self, id: &str, mut patch: DebatePatch) -> ApiResult<Debate> {
        if let Some(title) = patch.title.take() {
            patch.title = Some(validate_title(&title)?);
        }
        if let Some(category) = patch.category.take() {
            // Admins may file a debate back under the fallback bucket
            let canonical = canonical_category(&category)
                .or_else(|| {
                    category
                        .trim()
                        .eq_ignore_ascii_case(FALLBACK_CATEGORY)
                        .then_some(FALLBACK_CATEGORY)
                })
                .ok_or_else(|| {
                    ApiError::Validation(format!("Unknown category \"{}\"", category.trim()))
                })?;
            patch.category = Some(canonical.to_string());
        }
        patch.description = patch.description.map(non_empty);
        patch.sub_category = patch.sub_category.map(non_empty);

        let debate = self
            .store
            .update_debate(id, patch)
            .await?
            .ok_or(ApiError::NotFound("Debate"))?;
        tracing::info!(debate_id = %debate.id, "Debate updated by admin");
        Ok(debate)
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        if !self.store.delete_debate(id).await? {
            return Err(ApiError::NotFound("Debate"));
        }
        tracing::info!(debate_id = id, "Debate deleted by admin");
        Ok(())
    }

    /// All options, newest first, each with its debate's title and slug
    pub async fn list_options_admin(
        &self,
        debate_id: Option<String>,
        pagination: Pagination,
    ) -> ApiResult<Page<AdminOption>> {
        let page = self
            .store
            .list_all_options(&OptionQuery {
                debate_id: non_empty(debate_id),
                page: pagination.page,
                limit: pagination.limit,
            })
            .await?;

        let mut items = Vec::with_capacity(page.items.len());
        for option in page.items {
            let debate = self.store.get_debate(&option.debate_id).await?;
            let (debate_title, debate_slug) = match debate {
                Some(d) => (d.title, d.slug),
                None => ("Unknown Debate".to_string(), String::new()),
            };
            items.push(AdminOption {
                option,
                debate_title,
                debate_slug,
            });
        }
        Ok(Page {
            items,
            total: page.total,
        })
    }

    pub async fn delete_option(&self, id: &str) -> ApiResult<()> {
        if !self.store.delete_option(id).await? {
            return Err(ApiError::NotFound("Option"));
        }
        tracing::info!(option_id = id, "Option deleted by admin");
        Ok(())
    }
}
