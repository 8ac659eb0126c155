//! Process configuration assembled from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::limiter::LimitsConfig;
use crate::llm::LlmConfig;

/// Everything the binary needs to build the service
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub limits: LimitsConfig,
    /// Upper bound for one classifier call, fallbacks included
    pub classifier_timeout: Duration,
    /// How often stale rate-limit windows are pruned
    pub sweep_interval: Duration,
    pub llm: LlmConfig,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            limits: LimitsConfig::default(),
            classifier_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(3600),
            llm: LlmConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

fn secs_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid BIND_ADDR '{}': {}", raw, e);
                defaults.bind_addr
            }),
            Err(_) => defaults.bind_addr,
        };

        Self {
            bind_addr,
            limits: LimitsConfig::from_env(),
            classifier_timeout: secs_var("CLASSIFIER_TIMEOUT")
                .unwrap_or(defaults.classifier_timeout),
            sweep_interval: secs_var("WINDOW_SWEEP_SECS").unwrap_or(defaults.sweep_interval),
            llm: LlmConfig::from_env(),
            auth: AuthConfig::from_env(),
        }
    }
}
