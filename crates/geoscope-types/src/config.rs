//! Application configuration, constructed once at startup from environment
//! variables and threaded into every component.

use std::env;

use serde::{Deserialize, Serialize};

use crate::errors::{AuditError, Result};

/// Chat-completion backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Process-wide configuration. No component reads the environment after
/// this is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub worker_pool_size: usize,
    pub crawl_cap_default: usize,
    pub crawl_cap_max: usize,
    pub fetch_timeout_secs: u64,
    pub perf_staleness_hours: i64,
    pub queue_capacity: usize,
    pub ssrf_allow_loopback: bool,
    pub llm_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_primary: Option<LlmEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_fallback: Option<LlmEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf_oracle_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf_oracle_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_oracle_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_oracle_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_engine_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            crawl_cap_default: 50,
            crawl_cap_max: 500,
            fetch_timeout_secs: 20,
            perf_staleness_hours: 24,
            queue_capacity: 256,
            ssrf_allow_loopback: false,
            llm_model: "gpt-4o-mini".to_string(),
            llm_primary: None,
            llm_fallback: None,
            perf_oracle_url: None,
            perf_oracle_key: None,
            search_oracle_url: None,
            search_oracle_key: None,
            search_engine_id: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            worker_pool_size: env_usize("WORKER_POOL_SIZE", defaults.worker_pool_size)?,
            crawl_cap_default: env_usize("CRAWL_CAP_DEFAULT", defaults.crawl_cap_default)?,
            crawl_cap_max: env_usize("CRAWL_CAP_MAX", defaults.crawl_cap_max)?,
            fetch_timeout_secs: env_u64("FETCH_TIMEOUT_SECONDS", defaults.fetch_timeout_secs)?,
            perf_staleness_hours: env_u64("PERF_STALENESS_HOURS", 24)? as i64,
            queue_capacity: env_usize("JOB_QUEUE_CAPACITY", defaults.queue_capacity)?,
            ssrf_allow_loopback: env_bool("SSRF_ALLOW_LOOPBACK", false)?,
            llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_primary: env_endpoint("LLM_PRIMARY_URL", "LLM_PRIMARY_KEY"),
            llm_fallback: env_endpoint("LLM_FALLBACK_URL", "LLM_FALLBACK_KEY"),
            perf_oracle_url: env::var("PERF_ORACLE_URL").ok(),
            perf_oracle_key: env::var("PERF_ORACLE_KEY").ok(),
            search_oracle_url: env::var("SEARCH_ORACLE_URL").ok(),
            search_oracle_key: env::var("SEARCH_ORACLE_KEY").ok(),
            search_engine_id: env::var("SEARCH_ENGINE_ID").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(AuditError::invalid_config("WORKER_POOL_SIZE must be > 0"));
        }
        if self.crawl_cap_default > self.crawl_cap_max {
            return Err(AuditError::invalid_config(
                "CRAWL_CAP_DEFAULT exceeds CRAWL_CAP_MAX",
            ));
        }
        Ok(())
    }

    /// Clamp a requested crawl cap to the configured maximum, substituting
    /// the default for zero.
    pub fn effective_crawl_cap(&self, requested: usize) -> usize {
        if requested == 0 {
            self.crawl_cap_default
        } else {
            requested.min(self.crawl_cap_max)
        }
    }
}

fn env_endpoint(url_var: &str, key_var: &str) -> Option<LlmEndpoint> {
    env::var(url_var).ok().map(|url| LlmEndpoint {
        url,
        api_key: env::var(key_var).ok(),
    })
}

fn env_u64(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|e| {
            AuditError::invalid_config(format!("{} is not an integer: {}", var, e))
        }),
        Err(_) => Ok(default),
    }
}

fn env_usize(var: &str, default: usize) -> Result<usize> {
    Ok(env_u64(var, default as u64)? as usize)
}

fn env_bool(var: &str, default: bool) -> Result<bool> {
    match env::var(var) {
        Ok(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(AuditError::invalid_config(format!(
                "{} has invalid boolean value: {}",
                var, other
            ))),
        },
        Err(_) => Ok(default),
    }
}
