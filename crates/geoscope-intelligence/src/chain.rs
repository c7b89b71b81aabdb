//! Ordered provider chain walked on transient failure.

use std::sync::Arc;

use geoscope_types::{AppConfig, AuditError, Result};
use tracing::{info, warn};

use crate::provider::{ChatCompleter, ChatRequest, HttpChatProvider};

/// Holds the configured backends in priority order. A transient failure
/// of one provider moves on to the next; non-transient failures (bad
/// request, auth) stop immediately.
pub struct CompletionChain {
    providers: Vec<Arc<dyn ChatCompleter>>,
}

impl CompletionChain {
    pub fn new(providers: Vec<Arc<dyn ChatCompleter>>) -> Self {
        Self { providers }
    }

    /// Build the primary → fallback chain from configuration. An
    /// unconfigured chain is valid: every call reports the LLM
    /// unavailable and agents fall back deterministically.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut providers: Vec<Arc<dyn ChatCompleter>> = Vec::new();
        if let Some(endpoint) = &config.llm_primary {
            providers.push(Arc::new(HttpChatProvider::new(
                "primary",
                endpoint.clone(),
                &config.llm_model,
            )?));
        }
        if let Some(endpoint) = &config.llm_fallback {
            providers.push(Arc::new(HttpChatProvider::new(
                "fallback",
                endpoint.clone(),
                &config.llm_model,
            )?));
        }
        Ok(Self { providers })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run the request against each provider in order until one succeeds.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if self.providers.is_empty() {
            return Err(AuditError::LlmUnavailable {
                message: "no chat backend configured".to_string(),
            });
        }

        let mut last_error: Option<AuditError> = None;
        for provider in &self.providers {
            match provider.complete(request).await {
                Ok(content) => {
                    if last_error.is_some() {
                        info!(provider = %provider.name(), "llm call succeeded on fallback provider");
                    }
                    return Ok(content);
                }
                Err(e) if e.is_retryable() || matches!(e, AuditError::Parse { .. }) => {
                    warn!(provider = %provider.name(), error = %e, "llm provider failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all providers failed".to_string());
        Err(AuditError::LlmUnavailable { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        label: &'static str,
        calls: AtomicU32,
        result: std::result::Result<&'static str, fn() -> AuditError>,
    }

    impl ScriptedProvider {
        fn ok(label: &'static str, content: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                calls: AtomicU32::new(0),
                result: Ok(content),
            })
        }

        fn failing(label: &'static str, make: fn() -> AuditError) -> Arc<Self> {
            Arc::new(Self {
                label,
                calls: AtomicU32::new(0),
                result: Err(make),
            })
        }
    }

    #[async_trait]
    impl ChatCompleter for ScriptedProvider {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(content) => Ok(content.to_string()),
                Err(make) => Err(make()),
            }
        }

        fn name(&self) -> String {
            self.label.to_string()
        }
    }

    fn outage() -> AuditError {
        AuditError::Http5xx { status: 503 }
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = ScriptedProvider::ok("primary", "from primary");
        let fallback = ScriptedProvider::ok("fallback", "from fallback");
        let chain = CompletionChain::new(vec![primary.clone(), fallback.clone()]);

        let content = chain.complete(&ChatRequest::new("s", "u")).await.unwrap();
        assert_eq!(content, "from primary");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_primary_failure_walks_to_fallback() {
        let primary = ScriptedProvider::failing("primary", outage);
        let fallback = ScriptedProvider::ok("fallback", "rescued");
        let chain = CompletionChain::new(vec![primary.clone(), fallback]);

        let content = chain.complete(&ChatRequest::new("s", "u")).await.unwrap();
        assert_eq!(content, "rescued");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn total_outage_reports_llm_unavailable() {
        let chain = CompletionChain::new(vec![
            ScriptedProvider::failing("primary", outage),
            ScriptedProvider::failing("fallback", outage),
        ]);
        let err = chain.complete(&ChatRequest::new("s", "u")).await.unwrap_err();
        assert_eq!(err.kind(), "llm_unavailable");
    }

    #[tokio::test]
    async fn empty_chain_is_unavailable() {
        let chain = CompletionChain::new(vec![]);
        let err = chain.complete(&ChatRequest::new("s", "u")).await.unwrap_err();
        assert_eq!(err.kind(), "llm_unavailable");
    }
}
