use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{debate_listing, PUBLIC_PAGE_SIZE};
use crate::error::ApiResult;
use crate::limiter::Identity;
use crate::state::{AppState, CreatedDebate, DebateDraft, DebateWithOptions, NewDebate, Pagination};
use crate::types::*;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// List approved, active debates.
///
/// GET /api/debates?category=&page=&limit=
pub async fn list_debates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<impl Serialize>> {
    let pagination = Pagination::new(query.page, query.limit, PUBLIC_PAGE_SIZE);
    let page = state.debates.list_public(query.category, pagination).await?;
    Ok(Json(debate_listing(page, pagination)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDebateRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub is_more_option_allowed: Option<bool>,
}

/// Create a debate; it goes live immediately only if the classifier says SAFE.
///
/// POST /api/debates
pub async fn create_debate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDebateRequest>,
) -> ApiResult<(StatusCode, Json<CreatedDebate>)> {
    let created = state
        .debates
        .create_debate(NewDebate {
            title: req.title,
            description: req.description,
            category: req.category,
            sub_category: req.sub_category,
            options: req.options,
            is_more_option_allowed: req.is_more_option_allowed,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/debates/{slug}
pub async fn get_debate(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<DebateWithOptions>> {
    Ok(Json(state.debates.get_public(&slug).await?))
}

#[derive(Debug, Deserialize)]
pub struct CurrentVoteQuery {
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentVoteResponse {
    pub option_id: Option<OptionId>,
}

/// The voter's authoritative current choice in a debate.
///
/// GET /api/debates/{id}/vote?fingerprint=
pub async fn current_vote(
    State(state): State<Arc<AppState>>,
    Path(debate_id): Path<String>,
    Query(query): Query<CurrentVoteQuery>,
) -> ApiResult<Json<CurrentVoteResponse>> {
    let option_id = state
        .votes
        .current_choice(&debate_id, &query.fingerprint)
        .await?;
    Ok(Json(CurrentVoteResponse { option_id }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub debate_id: String,
    #[serde(default)]
    pub option_id: String,
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub success: bool,
    /// True when an earlier vote moved to this option
    pub is_change: bool,
    /// True when this option was already the voter's choice
    pub unchanged: bool,
    pub current_option_id: OptionId,
}

/// POST /api/vote
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let receipt = state
        .votes
        .record_vote(&req.debate_id, &req.option_id, &req.fingerprint)
        .await?;
    Ok(Json(VoteResponse {
        success: true,
        is_change: receipt.changed(),
        unchanged: receipt.unchanged(),
        current_option_id: receipt.current_option_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRequest {
    #[serde(default)]
    pub debate_id: String,
    #[serde(default)]
    pub name: String,
}

/// Propose a new option for a debate.
///
/// POST /api/option
pub async fn add_option(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OptionRequest>,
) -> ApiResult<(StatusCode, Json<DebateOption>)> {
    let identity = Identity::from_headers(&headers);
    let option = state
        .submissions
        .submit_option(&req.debate_id, &req.name, &identity)
        .await?;
    Ok((StatusCode::CREATED, Json(option)))
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    #[serde(default)]
    pub prompt: String,
}

/// POST /api/ai/draft
pub async fn generate_draft(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DraftRequest>,
) -> ApiResult<Json<DebateDraft>> {
    let identity = Identity::from_headers(&headers);
    Ok(Json(state.drafts.generate_draft(&req.prompt, &identity).await?))
}
