//! Degraded provider used when no search oracle is configured.

use async_trait::async_trait;
use geoscope_types::{Market, Result};
use tracing::debug;

use crate::{SearchHit, SearchProvider};

/// Returns no hits for every query. Keeps the pipeline shape intact when
/// discovery is unavailable: audits proceed with explicit competitors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneProvider;

#[async_trait]
impl SearchProvider for NoneProvider {
    async fn search(&self, query: &str, _limit: u32, _market: Market) -> Result<Vec<SearchHit>> {
        debug!(query = %query, "search oracle not configured, returning no hits");
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_empty() {
        let provider = NoneProvider;
        let hits = provider.search("geo audit tool", 10, Market::Us).await.unwrap();
        assert!(hits.is_empty());
    }
}
