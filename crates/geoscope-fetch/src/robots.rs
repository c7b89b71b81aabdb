//! robots.txt compliance with a per-host cache.
//!
//! Rules are fetched once per host and cached for [`ROBOTS_CACHE_TTL`].
//! Unreachable, non-200, or unparseable robots files mean "no rules".

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use tracing::debug;
use url::Url;

use crate::client::Fetcher;

/// How long fetched rules stay valid.
pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CachedRobots {
    /// Raw robots.txt body; empty string means "allow everything".
    content: String,
    cached_at: Instant,
}

impl CachedRobots {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > ROBOTS_CACHE_TTL
    }
}

/// Per-host robots.txt cache consulted by the crawler before every fetch.
#[derive(Debug)]
pub struct RobotsManager {
    fetcher: Arc<Fetcher>,
    cache: DashMap<String, CachedRobots>,
}

impl RobotsManager {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            cache: DashMap::new(),
        }
    }

    /// Whether the configured User-Agent may fetch `url`. Missing rules
    /// allow everything.
    pub async fn is_allowed(&self, url: &Url, mobile: bool) -> bool {
        let host = match url.host_str() {
            Some(host) => host.to_string(),
            None => return true,
        };

        let content = self.rules_for(&host, url, mobile).await;
        if content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        let allowed =
            matcher.one_agent_allowed_by_robots(&content, Fetcher::user_agent(mobile), url.as_str());
        if !allowed {
            debug!(url = %url, "disallowed by robots.txt");
        }
        allowed
    }

    async fn rules_for(&self, host: &str, url: &Url, mobile: bool) -> String {
        if let Some(cached) = self.cache.get(host) {
            if !cached.is_expired() {
                return cached.content.clone();
            }
        }

        let content = self.fetcher.robots_txt(url, mobile).await.unwrap_or_default();
        self.cache.insert(
            host.to_string(),
            CachedRobots {
                content: content.clone(),
                cached_at: Instant::now(),
            },
        );
        content
    }

    /// Number of hosts with cached rules.
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }
}
