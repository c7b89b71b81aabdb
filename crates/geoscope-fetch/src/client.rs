//! Page fetcher with mobile and desktop browser profiles.
//!
//! Redirects are followed manually so that every hop passes the SSRF
//! check and connects through the pinned resolver; the HTTP clients
//! themselves never chase a Location header or resolve a hostname on
//! their own.

use std::time::{Duration, Instant};

use geoscope_types::{AuditError, Language, Result};
use reqwest::{header, redirect, Client};
use tracing::{debug, instrument};
use url::Url;

use crate::dns::PinnedDns;
use crate::ssrf;

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";

const MAX_REDIRECTS: usize = 5;

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Wall-clock timeout covering connect, read, and redirect hops.
    pub timeout: Duration,
    /// Permit loopback destinations (development only).
    pub allow_loopback: bool,
    /// Bodies beyond this size are truncated, not rejected.
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            allow_loopback: false,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Result of one page fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// URL after redirects, which may differ from the requested one.
    pub final_url: String,
    pub truncated: bool,
}

impl FetchResult {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP GET client used for all page and robots.txt retrieval. Holds one
/// connection pool per device profile, both wired to the pinned
/// resolver. No retries at this layer.
#[derive(Debug)]
pub struct Fetcher {
    desktop: Client,
    mobile: Client,
    dns: PinnedDns,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let dns = PinnedDns::default();
        Ok(Self {
            desktop: build_client(DESKTOP_UA, dns.clone())?,
            mobile: build_client(MOBILE_UA, dns.clone())?,
            dns,
            config,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(FetchConfig::default())
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a page with the configured timeout.
    pub async fn fetch(&self, url: &str, language: Language, mobile: bool) -> Result<FetchResult> {
        self.fetch_with_timeout(url, language, mobile, self.config.timeout)
            .await
    }

    /// Fetch a page with an explicit wall-clock timeout. Every hop,
    /// including each redirect target, is SSRF-checked after DNS
    /// resolution; the validated addresses are pinned so the connect
    /// cannot go anywhere else.
    #[instrument(skip(self), fields(url = %url, mobile = mobile))]
    pub async fn fetch_with_timeout(
        &self,
        url: &str,
        language: Language,
        mobile: bool,
        timeout: Duration,
    ) -> Result<FetchResult> {
        let client = if mobile { &self.mobile } else { &self.desktop };
        let started = Instant::now();
        let mut current = Url::parse(url)?;

        for _hop in 0..=MAX_REDIRECTS {
            if !matches!(current.scheme(), "http" | "https") {
                return Err(AuditError::network(format!(
                    "refusing non-http redirect target: {}",
                    current
                )));
            }
            let addrs = ssrf::resolve_public_addrs(&current, self.config.allow_loopback).await?;
            if let Some(host) = current.host_str() {
                self.dns.pin(host, addrs);
            }

            let remaining = timeout
                .checked_sub(started.elapsed())
                .ok_or_else(|| AuditError::timeout(format!("fetch {}", url), timeout.as_secs()))?;
            let response = client
                .get(current.clone())
                .header(header::ACCEPT_LANGUAGE, language.accept_language())
                .timeout(remaining)
                .send()
                .await
                .map_err(|e| map_send_error(url, timeout, e))?;

            let status = response.status();
            if status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    current = current.join(location).map_err(|e| {
                        AuditError::network(format!("unusable redirect target: {}", e))
                    })?;
                    continue;
                }
                // A 3xx without Location (e.g. 304) is a final response.
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            let (body, truncated) = self.read_body(response).await?;
            debug!(
                status = status.as_u16(),
                bytes = body.len(),
                truncated = truncated,
                "fetched page"
            );

            return Ok(FetchResult {
                status: status.as_u16(),
                content_type,
                body,
                final_url: current.to_string(),
                truncated,
            });
        }

        Err(AuditError::network(format!(
            "redirect limit exceeded for {}",
            url
        )))
    }

    /// Retrieve `/robots.txt` for the URL's origin. Missing, errored, or
    /// non-200 responses mean "no rules" and yield `None`.
    pub async fn robots_txt(&self, base: &Url, mobile: bool) -> Option<String> {
        let robots_url = base.join("/robots.txt").ok()?;
        let result = self
            .fetch_with_timeout(
                robots_url.as_str(),
                Language::En,
                mobile,
                Duration::from_secs(10),
            )
            .await;
        match result {
            Ok(fetched) if fetched.status == 200 => Some(fetched.body_text()),
            _ => None,
        }
    }

    pub fn user_agent(mobile: bool) -> &'static str {
        if mobile {
            MOBILE_UA
        } else {
            DESKTOP_UA
        }
    }

    async fn read_body(&self, mut response: reqwest::Response) -> Result<(Vec<u8>, bool)> {
        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) if e.is_timeout() => {
                    return Err(AuditError::timeout(
                        "body read",
                        self.config.timeout.as_secs(),
                    ))
                }
                Err(e) => return Err(AuditError::network(e.to_string())),
            };
            if body.len() + chunk.len() > self.config.max_body_bytes {
                let keep = self.config.max_body_bytes - body.len();
                body.extend_from_slice(&chunk[..keep]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok((body, truncated))
    }
}

fn build_client(user_agent: &str, dns: PinnedDns) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .gzip(true)
        // Redirects are followed manually with a per-hop SSRF check.
        .redirect(redirect::Policy::none())
        .dns_resolver(std::sync::Arc::new(dns))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| AuditError::internal(format!("failed to build http client: {}", e)))
}

fn map_send_error(url: &str, timeout: Duration, e: reqwest::Error) -> AuditError {
    if e.is_timeout() {
        AuditError::timeout(format!("fetch {}", url), timeout.as_secs())
    } else {
        AuditError::network(e.to_string())
    }
}
