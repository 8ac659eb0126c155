//! Per-identity daily quotas for content-creation actions.
//!
//! Provides:
//! - Caller identity extraction from proxy headers
//! - One window per (identity, calendar day, action class), stored hashed
//! - A configurable fail-open/fail-closed policy when the window store errors

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::store::WindowStore;
use crate::types::{ActionClass, WindowKey};

/// The caller's network identity as seen through the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    /// No extractable address. Such callers are never metered.
    Unknown,
}

impl Identity {
    /// First hop of `X-Forwarded-For`, else `X-Real-IP`
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"));

        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        match forwarded.or_else(real_ip) {
            Some(addr) => Identity::Known(addr.to_string()),
            None => Identity::Unknown,
        }
    }

    /// Stable digest used as the window key, so raw addresses are never stored
    fn digest(&self) -> Option<String> {
        match self {
            Identity::Known(addr) => Some(hex::encode(Sha256::digest(addr.as_bytes()))),
            Identity::Unknown => None,
        }
    }
}

/// What to do when the window store cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Allow the action unmetered
    Open,
    /// Deny the action
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct LimitPolicy {
    pub daily_limit: u32,
    pub on_store_failure: FailurePolicy,
}

/// Daily limits per guarded action
#[derive(Debug, Clone, Copy)]
pub struct LimitsConfig {
    pub option_creation: LimitPolicy,
    pub draft_generation: LimitPolicy,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            option_creation: LimitPolicy {
                daily_limit: 10,
                on_store_failure: FailurePolicy::Closed,
            },
            draft_generation: LimitPolicy {
                daily_limit: 3,
                on_store_failure: FailurePolicy::Closed,
            },
        }
    }
}

impl LimitsConfig {
    /// Load limits from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limit = |var: &str, default: u32| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let fail_open = |var: &str| {
            std::env::var(var)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };
        let policy = |open: bool| {
            if open {
                FailurePolicy::Open
            } else {
                FailurePolicy::Closed
            }
        };

        let config = Self {
            option_creation: LimitPolicy {
                daily_limit: limit(
                    "OPTION_DAILY_LIMIT",
                    defaults.option_creation.daily_limit,
                ),
                on_store_failure: policy(fail_open("OPTION_LIMIT_FAIL_OPEN")),
            },
            draft_generation: LimitPolicy {
                daily_limit: limit("DRAFT_DAILY_LIMIT", defaults.draft_generation.daily_limit),
                on_store_failure: policy(fail_open("DRAFT_LIMIT_FAIL_OPEN")),
            },
        };

        tracing::info!(
            option_limit = config.option_creation.daily_limit,
            draft_limit = config.draft_generation.daily_limit,
            "Rate limits loaded"
        );
        config
    }

    pub fn policy(&self, action: ActionClass) -> LimitPolicy {
        match action {
            ActionClass::OptionCreation => self.option_creation,
            ActionClass::DraftGeneration => self.draft_generation,
        }
    }
}

/// Answer of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Remaining actions today; `None` when the caller is not metered
    pub remaining: Option<u32>,
}

impl Decision {
    fn unmetered() -> Self {
        Self {
            allowed: true,
            remaining: None,
        }
    }

    fn denied() -> Self {
        Self {
            allowed: false,
            remaining: Some(0),
        }
    }
}

/// Daily quota counter backed by the window store
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<dyn WindowStore>,
    limits: LimitsConfig,
}

impl RateLimiter {
    pub fn new(windows: Arc<dyn WindowStore>, limits: LimitsConfig) -> Self {
        Self { windows, limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    fn key(digest: String, action: ActionClass, now: DateTime<Utc>) -> WindowKey {
        WindowKey {
            identity: digest,
            day: now.date_naive(),
            action,
        }
    }

    fn on_failure(&self, action: ActionClass, error: impl std::fmt::Display) -> Decision {
        let policy = self.limits.policy(action);
        tracing::warn!(
            action = action.as_str(),
            policy = ?policy.on_store_failure,
            "Rate limit store failed: {}",
            error
        );
        match policy.on_store_failure {
            FailurePolicy::Open => Decision::unmetered(),
            FailurePolicy::Closed => Decision::denied(),
        }
    }

    /// Check the quota without consuming it
    pub async fn check(&self, identity: &Identity, action: ActionClass) -> Decision {
        self.check_at(identity, action, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        identity: &Identity,
        action: ActionClass,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(digest) = identity.digest() else {
            return Decision::unmetered();
        };
        let limit = self.limits.policy(action).daily_limit;

        match self.windows.get_window(&Self::key(digest, action, now)).await {
            Ok(window) => {
                let used = window.map(|w| w.count).unwrap_or(0);
                Decision {
                    allowed: used < limit,
                    remaining: Some(limit.saturating_sub(used)),
                }
            }
            Err(e) => self.on_failure(action, e),
        }
    }

    /// Record one admitted action. Failures are logged, never surfaced: the
    /// action has already happened.
    pub async fn consume(&self, identity: &Identity, action: ActionClass) {
        self.consume_at(identity, action, Utc::now()).await
    }

    pub async fn consume_at(&self, identity: &Identity, action: ActionClass, now: DateTime<Utc>) {
        let Some(digest) = identity.digest() else {
            return;
        };
        match self
            .windows
            .increment_window(&Self::key(digest, action, now), now)
            .await
        {
            Ok(count) => tracing::debug!(action = action.as_str(), count, "Quota consumed"),
            Err(e) => tracing::warn!(
                action = action.as_str(),
                "Failed to record quota usage: {}",
                e
            ),
        }
    }

    /// Atomically check and consume one unit of quota
    pub async fn check_and_consume(&self, identity: &Identity, action: ActionClass) -> Decision {
        self.check_and_consume_at(identity, action, Utc::now()).await
    }

    pub async fn check_and_consume_at(
        &self,
        identity: &Identity,
        action: ActionClass,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(digest) = identity.digest() else {
            return Decision::unmetered();
        };
        let limit = self.limits.policy(action).daily_limit;

        match self
            .windows
            .increment_window_below(&Self::key(digest, action, now), limit, now)
            .await
        {
            Ok(Some(count)) => Decision {
                allowed: true,
                remaining: Some(limit.saturating_sub(count)),
            },
            Ok(None) => Decision::denied(),
            Err(e) => self.on_failure(action, e),
        }
    }
}
