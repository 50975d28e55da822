use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, ServiceError};
use crate::model::EvictionPolicy;
use crate::time::{parse_duration, TimeUnit};

/// Typed, load-once-at-startup configuration (`§6.5`, design note "Dynamic
/// config objects -> explicit config struct"). Invalid combinations fail
/// loudly with `CONFIG_ERROR` rather than being silently coerced.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_dir: String,

    pub max_scratchpads: u64,
    pub max_cells_per_pad: u64,
    pub max_cell_bytes: u64,
    pub eviction_policy: EvictionPolicy,
    pub preempt_age: Duration,
    pub preempt_interval: Duration,

    pub validation_request_timeout: Duration,
    pub shutdown_timeout: Duration,

    pub enable_stdio: bool,
    pub enable_http: bool,
    pub enable_sse: bool,
    pub enable_metrics: bool,

    pub http_host: String,
    pub http_port: u16,
    pub http_socket_path: Option<String>,
    pub http_path: String,
    pub sse_path: String,
    pub metrics_path: String,

    pub enable_auth: bool,
    /// `principal -> token`, preserving CLI/file declaration order so the
    /// first-enable migration (`§4.A`) can pick "the first configured
    /// tenant" deterministically.
    pub tenants: Vec<(String, String)>,

    pub enable_semantic_search: bool,
    pub embedding_model: String,
    pub embedding_device: String,
    pub embedding_batch_size: u32,
    pub semantic_search_limit: u32,
    /// Remote embedding service base URL. Unset falls back to the built-in
    /// deterministic local embedder.
    pub embedding_endpoint: Option<String>,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Mirrors the teacher's `Config::from_env()` single-function style
    /// (`records/src/config.rs`, `search/src/config.rs`).
    pub fn from_env() -> Result<Self> {
        let storage_dir = env_str("SCRATCH_STORAGE_DIR", "./scratch-data");

        let max_scratchpads = env_u64("SCRATCH_MAX_SCRATCHPADS", 0);
        let max_cells_per_pad = env_u64("SCRATCH_MAX_CELLS_PER_PAD", 0);
        let max_cell_bytes = env_u64("SCRATCH_MAX_CELL_BYTES", 0);

        let eviction_policy = match env_str("SCRATCH_EVICTION_POLICY", "fail").as_str() {
            "discard" => EvictionPolicy::Discard,
            "fail" => EvictionPolicy::Fail,
            "preempt" => EvictionPolicy::Preempt,
            other => {
                return Err(ServiceError::ConfigError(format!(
                    "unknown eviction_policy: {other}"
                )))
            }
        };

        let preempt_age = parse_duration(&env_str("SCRATCH_PREEMPT_AGE", "24h"), TimeUnit::Hours)
            .ok_or_else(|| ServiceError::ConfigError("invalid preempt_age".to_string()))?;
        let preempt_interval = parse_duration(
            &env_str("SCRATCH_PREEMPT_INTERVAL", "10m"),
            TimeUnit::Minutes,
        )
        .ok_or_else(|| ServiceError::ConfigError("invalid preempt_interval".to_string()))?;

        let validation_request_timeout = parse_duration(
            &env_str("SCRATCH_VALIDATION_REQUEST_TIMEOUT", "5s"),
            TimeUnit::Seconds,
        )
        .ok_or_else(|| ServiceError::ConfigError("invalid validation_request_timeout".into()))?;

        let shutdown_timeout = parse_duration(&env_str("SCRATCH_SHUTDOWN_TIMEOUT", "5s"), TimeUnit::Seconds)
            .ok_or_else(|| ServiceError::ConfigError("invalid shutdown_timeout".to_string()))?;

        let enable_stdio = env_bool("SCRATCH_ENABLE_STDIO", true);
        let enable_http = env_bool("SCRATCH_ENABLE_HTTP", false);
        let enable_sse = env_bool("SCRATCH_ENABLE_SSE", false);
        let enable_metrics = env_bool("SCRATCH_ENABLE_METRICS", false);

        if enable_metrics && !enable_http {
            return Err(ServiceError::ConfigError(
                "enable_metrics requires enable_http".to_string(),
            ));
        }

        let http_path = env_str("SCRATCH_HTTP_PATH", "/http");
        let sse_path = env_str("SCRATCH_SSE_PATH", "/sse");
        if enable_http && enable_sse && http_path == sse_path {
            return Err(ServiceError::ConfigError(
                "http_path and sse_path must differ".to_string(),
            ));
        }

        let enable_auth = env_bool("SCRATCH_ENABLE_AUTH", false);
        let tenants = parse_tenant_registry(&env_str("SCRATCH_TENANTS", ""));
        if enable_auth && tenants.is_empty() {
            return Err(ServiceError::ConfigError(
                "enable_auth requires at least one principal:token entry".to_string(),
            ));
        }

        Ok(Config {
            storage_dir,
            max_scratchpads,
            max_cells_per_pad,
            max_cell_bytes,
            eviction_policy,
            preempt_age,
            preempt_interval,
            validation_request_timeout,
            shutdown_timeout,
            enable_stdio,
            enable_http,
            enable_sse,
            enable_metrics,
            http_host: env_str("SCRATCH_HTTP_HOST", "127.0.0.1"),
            http_port: env_u64("SCRATCH_HTTP_PORT", 8088) as u16,
            http_socket_path: std::env::var("SCRATCH_HTTP_SOCKET_PATH").ok(),
            http_path,
            sse_path,
            metrics_path: env_str("SCRATCH_METRICS_PATH", "/metrics"),
            enable_auth,
            tenants,
            enable_semantic_search: env_bool("SCRATCH_ENABLE_SEMANTIC_SEARCH", true),
            embedding_model: env_str("SCRATCH_EMBEDDING_MODEL", "local-hash-384"),
            embedding_device: env_str("SCRATCH_EMBEDDING_DEVICE", "cpu"),
            embedding_batch_size: env_u64("SCRATCH_EMBEDDING_BATCH_SIZE", 16) as u32,
            semantic_search_limit: env_u64("SCRATCH_SEMANTIC_SEARCH_LIMIT", 50) as u32,
            embedding_endpoint: std::env::var("SCRATCH_EMBEDDING_ENDPOINT").ok(),
        })
    }

    pub fn implicit_default_tenant(&self) -> &str {
        "default"
    }

    /// The tenant the first-enable migration (`§4.A`) reassigns
    /// implicit-default pads to: first by CLI/file declaration order.
    pub fn first_configured_tenant(&self) -> Option<&str> {
        self.tenants.first().map(|(principal, _)| principal.as_str())
    }

    pub fn token_registry(&self) -> HashMap<String, String> {
        self.tenants
            .iter()
            .map(|(principal, token)| (token.clone(), principal.clone()))
            .collect()
    }
}

/// Parses a `principal:token[,principal:token...]` list, preserving order.
fn parse_tenant_registry(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| entry.split_once(':'))
        .map(|(p, t)| (p.trim().to_string(), t.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_registry_preserves_order() {
        let parsed = parse_tenant_registry("alice:tok-a, bob:tok-b");
        assert_eq!(
            parsed,
            vec![
                ("alice".to_string(), "tok-a".to_string()),
                ("bob".to_string(), "tok-b".to_string()),
            ]
        );
    }
}
