//! Pinned DNS resolution for the fetcher's HTTP clients.
//!
//! The SSRF guard resolves and validates a host's addresses before each
//! request; this resolver hands exactly those addresses to the HTTP
//! client. It never performs a lookup of its own, so the address that was
//! checked is the address that gets connected to. A host that was not
//! pinned first fails to resolve.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

#[derive(Debug, Clone, Default)]
pub(crate) struct PinnedDns {
    entries: Arc<DashMap<String, Vec<SocketAddr>>>,
}

impl PinnedDns {
    /// Record the validated addresses for a host, replacing any earlier
    /// pin. Called immediately before the request that uses them.
    pub(crate) fn pin(&self, host: &str, addrs: Vec<SocketAddr>) {
        self.entries.insert(host.to_lowercase(), addrs);
    }
}

impl Resolve for PinnedDns {
    fn resolve(&self, name: Name) -> Resolving {
        let entries = self.entries.clone();
        Box::pin(async move {
            let key = name.as_str().to_lowercase();
            match entries.get(&key) {
                Some(addrs) if !addrs.is_empty() => {
                    let addrs: Addrs = Box::new(addrs.clone().into_iter());
                    Ok(addrs)
                }
                _ => Err(format!("host {} was not validated before connect", key).into()),
            }
        })
    }
}
