//! Competitor discovery through an external search oracle.
//!
//! The oracle is a plain HTTP GET endpoint taking a query string and an
//! engine id and returning `{ items: [{link, title, snippet}] }`. A
//! missing or failing oracle degrades to "no competitors discovered"; the
//! pipeline continues with explicit competitors only.

mod none_provider;
mod oracle;

pub use none_provider::NoneProvider;
pub use oracle::OracleProvider;

use std::sync::Arc;

use async_trait::async_trait;
use geoscope_types::{AppConfig, Market, Result};

/// One organic search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub link: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub rank: u32,
}

impl SearchHit {
    pub fn new(link: impl Into<String>, rank: u32) -> Self {
        Self {
            link: link.into(),
            title: None,
            snippet: None,
            rank,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// A search backend usable for competitor discovery.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: u32, market: Market) -> Result<Vec<SearchHit>>;

    /// Short backend name for logging.
    fn name(&self) -> &'static str;
}

/// Build the provider the configuration calls for: the HTTP oracle when
/// configured, otherwise the none-provider.
pub fn create_search_provider(config: &AppConfig) -> Result<Arc<dyn SearchProvider>> {
    match &config.search_oracle_url {
        Some(url) => Ok(Arc::new(OracleProvider::new(
            url.clone(),
            config.search_oracle_key.clone(),
            config.search_engine_id.clone(),
        )?)),
        None => Ok(Arc::new(NoneProvider)),
    }
}

/// Country hint sent to the oracle for a target market.
pub(crate) fn market_country(market: Market) -> Option<&'static str> {
    match market {
        Market::Us => Some("us"),
        Market::Ar => Some("ar"),
        Market::Latam => Some("mx"),
        Market::Emea => Some("gb"),
        Market::None => None,
    }
}
