//! Shared-secret capability check for the admin surface

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin credentials and the token they unlock
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Token expected in `x-admin-token` (None = admin surface closed)
    pub secret_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_token", &self.secret_token.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AuthConfig {
    /// Load auth config from environment variables
    /// ADMIN_SECRET_TOKEN must be set to open the admin surface
    pub fn from_env() -> Self {
        let config = Self {
            secret_token: non_empty_var("ADMIN_SECRET_TOKEN"),
            username: non_empty_var("ADMIN_USERNAME"),
            password: non_empty_var("ADMIN_PASSWORD"),
        };

        if config.is_enabled() {
            tracing::info!("Admin authentication enabled");
            if config.username.is_none() || config.password.is_none() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to allow admin login"
                );
            }
        } else {
            tracing::warn!("ADMIN_SECRET_TOKEN not set - all admin requests will be refused");
        }
        config
    }

    /// Check if the admin surface is reachable at all
    pub fn is_enabled(&self) -> bool {
        self.secret_token.is_some()
    }

    pub fn validate_token(&self, token: &str) -> bool {
        match &self.secret_token {
            Some(secret) => constant_time_eq(secret.as_bytes(), token.as_bytes()),
            None => false,
        }
    }

    /// Exchange admin credentials for the admin token
    pub fn issue_token(&self, username: &str, password: &str) -> Option<String> {
        match (&self.secret_token, &self.username, &self.password) {
            (Some(secret), Some(u), Some(p)) => {
                // Evaluate both halves so timing does not reveal which one failed
                let user_ok = constant_time_eq(u.as_bytes(), username.as_bytes());
                let pass_ok = constant_time_eq(p.as_bytes(), password.as_bytes());
                (user_ok & pass_ok).then(|| secret.clone())
            }
            _ => None,
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Middleware requiring the admin token on admin routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match token {
        Some(token) if auth_config.validate_token(token) => next.run(request).await,
        _ => {
            tracing::debug!(path = %request.uri().path(), "Admin request without valid token");
            ApiError::Unauthorized.into_response()
        }
    }
}
