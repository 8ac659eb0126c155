use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    debate_listing, optional_json, option_listing, ADMIN_DEBATE_PAGE_SIZE, ADMIN_OPTION_PAGE_SIZE,
};
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, DebateWithOptions, Pagination};
use crate::store::DebatePatch;
use crate::types::*;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Exchange admin credentials for the admin token.
///
/// POST /api/admin/auth
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    match state.auth.issue_token(&req.username, &req.password) {
        Some(token) => {
            tracing::info!("Admin logged in");
            Ok(Json(LoginResponse { token }))
        }
        None => {
            tracing::warn!("Failed admin login attempt");
            Err(ApiError::Unauthorized)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /api/admin/debates?status=&page=&limit=
pub async fn list_debates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<impl Serialize>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(raw.parse::<DebateStatus>().map_err(ApiError::Validation)?),
    };
    let pagination = Pagination::new(query.page, query.limit, ADMIN_DEBATE_PAGE_SIZE);
    let page = state.debates.list_admin(status, pagination).await?;
    Ok(Json(debate_listing(page, pagination)))
}

/// GET /api/admin/debates/{id}
pub async fn get_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DebateWithOptions>> {
    Ok(Json(state.debates.get_admin(&id).await?))
}

/// Editable fields; slug and status are not among them
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDebateRequest {
    pub title: Option<String>,
    /// An empty string clears the description
    pub description: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub is_active: Option<bool>,
    pub is_more_option_allowed: Option<bool>,
}

/// PATCH /api/admin/debates/{id}
pub async fn update_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDebateRequest>,
) -> ApiResult<Json<Debate>> {
    let patch = DebatePatch {
        title: req.title,
        description: req.description.map(Some),
        category: req.category,
        sub_category: req.sub_category.map(Some),
        is_active: req.is_active,
        is_more_option_allowed: req.is_more_option_allowed,
    };
    Ok(Json(state.debates.update(&id, patch).await?))
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub success: bool,
}

/// DELETE /api/admin/debates/{id}
pub async fn delete_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    state.debates.delete(&id).await?;
    Ok(Json(Deleted { success: true }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub reason: Option<String>,
}

/// POST /api/admin/debates/{id}/approve
pub async fn approve_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Debate>> {
    // Accepted for symmetry with reject; approvals record no reason
    optional_json::<ReviewRequest>(&body)?;
    Ok(Json(state.review.approve(&id).await?))
}

/// POST /api/admin/debates/{id}/reject
pub async fn reject_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Debate>> {
    let review = optional_json::<ReviewRequest>(&body)?.unwrap_or_default();
    Ok(Json(state.review.reject(&id, review.reason).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionListQuery {
    pub debate_id: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /api/admin/options?debateId=&page=&limit=
pub async fn list_options(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OptionListQuery>,
) -> ApiResult<Json<impl Serialize>> {
    let pagination = Pagination::new(query.page, query.limit, ADMIN_OPTION_PAGE_SIZE);
    let page = state
        .debates
        .list_options_admin(query.debate_id, pagination)
        .await?;
    Ok(Json(option_listing(page, pagination)))
}

/// DELETE /api/admin/options/{id}
pub async fn delete_option(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    state.debates.delete_option(&id).await?;
    Ok(Json(Deleted { success: true }))
}
