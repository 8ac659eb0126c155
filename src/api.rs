//! HTTP surface: public debate and voting endpoints plus the admin routes.

mod admin;
mod public;

use axum::{
    body::Bytes,
    middleware,
    routing::{delete, get, post},
    Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, Pagination};
use crate::store::Page;

pub const PUBLIC_PAGE_SIZE: usize = 20;
pub const ADMIN_DEBATE_PAGE_SIZE: usize = 20;
pub const ADMIN_OPTION_PAGE_SIZE: usize = 50;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    // Everything below requires the admin token
    let gated = Router::new()
        .route("/debates", get(admin::list_debates))
        .route(
            "/debates/{id}",
            get(admin::get_debate)
                .patch(admin::update_debate)
                .delete(admin::delete_debate),
        )
        .route("/debates/{id}/approve", post(admin::approve_debate))
        .route("/debates/{id}/reject", post(admin::reject_debate))
        .route("/options", get(admin::list_options))
        .route("/options/{id}", delete(admin::delete_option))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::admin_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/auth", post(admin::login))
        .merge(gated);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/debates",
            get(public::list_debates).post(public::create_debate),
        )
        .route("/api/debates/{debate}", get(public::get_debate))
        .route("/api/debates/{debate}/vote", get(public::current_vote))
        .route("/api/vote", post(public::cast_vote))
        .route("/api/option", post(public::add_option))
        .route("/api/ai/draft", post(public::generate_draft))
        .nest("/api/admin", admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// One page of a listing as the clients expect it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Listing<T> {
    #[serde(flatten)]
    items: T,
    total: usize,
    page: usize,
    total_pages: usize,
}

#[derive(Debug, Serialize)]
struct Debates<T> {
    debates: Vec<T>,
}

#[derive(Debug, Serialize)]
struct Options<T> {
    options: Vec<T>,
}

fn debate_listing<T>(page: Page<T>, pagination: Pagination) -> Listing<Debates<T>> {
    Listing {
        total: page.total,
        page: pagination.page,
        total_pages: pagination.total_pages(page.total),
        items: Debates {
            debates: page.items,
        },
    }
}

fn option_listing<T>(page: Page<T>, pagination: Pagination) -> Listing<Options<T>> {
    Listing {
        total: page.total,
        page: pagination.page,
        total_pages: pagination.total_pages(page.total),
        items: Options {
            options: page.items,
        },
    }
}

/// Parse an optional JSON body; an empty body is `None`
fn optional_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::Validation(format!("Invalid JSON body: {}", e)))
}
