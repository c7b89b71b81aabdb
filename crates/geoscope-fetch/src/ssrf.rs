//! SSRF destination filtering.
//!
//! Every outbound page fetch resolves its host first and rejects targets in
//! loopback, link-local, or RFC 1918 space before any socket connect. The
//! validated addresses are returned so the caller can pin them into the
//! HTTP client's resolver; connecting through a second, independent
//! resolution would let a hostile DNS server answer differently between
//! the check and the connect. The loopback exemption must be explicit
//! (`SSRF_ALLOW_LOOPBACK`).

use std::net::{IpAddr, SocketAddr};

use geoscope_types::{AuditError, Result};
use tracing::debug;
use url::{Host, Url};

/// Resolve the URL's host and verify that every resolved address is
/// publicly routable, returning the addresses that passed. Literal IPs
/// are checked without a DNS query.
pub async fn resolve_public_addrs(url: &Url, allow_loopback: bool) -> Result<Vec<SocketAddr>> {
    let port = url.port_or_known_default().unwrap_or(80);
    match url.host() {
        None => Err(AuditError::invalid_config(format!(
            "url has no host: {}",
            url
        ))),
        Some(Host::Ipv4(v4)) => {
            check_addr(&v4.to_string(), IpAddr::V4(v4), allow_loopback)?;
            Ok(vec![SocketAddr::new(IpAddr::V4(v4), port)])
        }
        Some(Host::Ipv6(v6)) => {
            check_addr(&v6.to_string(), IpAddr::V6(v6), allow_loopback)?;
            Ok(vec![SocketAddr::new(IpAddr::V6(v6), port)])
        }
        Some(Host::Domain(domain)) => {
            let resolved = tokio::net::lookup_host((domain, port)).await.map_err(|e| {
                AuditError::network(format!("dns lookup failed for {}: {}", domain, e))
            })?;
            let addrs: Vec<SocketAddr> = resolved.collect();
            if addrs.is_empty() {
                return Err(AuditError::network(format!("no addresses for {}", domain)));
            }
            for addr in &addrs {
                check_addr(domain, addr.ip(), allow_loopback)?;
            }
            debug!(host = %domain, addrs = addrs.len(), "ssrf check passed");
            Ok(addrs)
        }
    }
}

/// Check-only variant for callers that validate without fetching.
pub async fn ensure_public_host(url: &Url, allow_loopback: bool) -> Result<()> {
    resolve_public_addrs(url, allow_loopback).await.map(|_| ())
}

fn check_addr(host: &str, ip: IpAddr, allow_loopback: bool) -> Result<()> {
    if is_blocked(ip, allow_loopback) {
        return Err(AuditError::SsrfBlocked {
            host: host.to_string(),
        });
    }
    Ok(())
}

fn is_blocked(ip: IpAddr, allow_loopback: bool) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            (v4.is_loopback() && !allow_loopback)
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            (v6.is_loopback() && !allow_loopback)
                || v6.is_unspecified()
                || is_v6_unique_local(v6)
                || is_v6_link_local(v6)
                || v6.to_ipv4_mapped()
                    .map(|v4| is_blocked(IpAddr::V4(v4), allow_loopback))
                    .unwrap_or(false)
        }
    }
}

// fc00::/7
fn is_v6_unique_local(ip: std::net::Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

// fe80::/10
fn is_v6_link_local(ip: std::net::Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn blocked(url: &str) -> bool {
        let url = Url::parse(url).unwrap();
        ensure_public_host(&url, false).await.is_err()
    }

    #[tokio::test]
    async fn loopback_is_blocked() {
        assert!(blocked("http://127.0.0.1/admin").await);
        assert!(blocked("http://127.0.0.1:8080/").await);
        assert!(blocked("http://[::1]/").await);
    }

    #[tokio::test]
    async fn rfc1918_ranges_are_blocked() {
        assert!(blocked("http://10.0.0.8/").await);
        assert!(blocked("http://172.16.4.1/").await);
        assert!(blocked("http://192.168.1.1/").await);
    }

    #[tokio::test]
    async fn link_local_is_blocked() {
        assert!(blocked("http://169.254.169.254/latest/meta-data").await);
        assert!(blocked("http://[fe80::1]/").await);
    }

    #[tokio::test]
    async fn unique_local_v6_is_blocked() {
        assert!(blocked("http://[fd00::1]/").await);
    }

    #[tokio::test]
    async fn loopback_allowed_when_explicit() {
        let url = Url::parse("http://127.0.0.1/").unwrap();
        assert!(ensure_public_host(&url, true).await.is_ok());
    }

    #[tokio::test]
    async fn blocked_error_is_typed() {
        let url = Url::parse("http://192.168.0.1/").unwrap();
        let err = ensure_public_host(&url, false).await.unwrap_err();
        assert_eq!(err.kind(), "ssrf_blocked");
    }

    #[tokio::test]
    async fn literal_hosts_resolve_to_socket_addrs() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        let addrs = resolve_public_addrs(&url, true).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse().unwrap()]);

        let v6 = Url::parse("http://[::1]:9090/").unwrap();
        let addrs = resolve_public_addrs(&v6, true).await.unwrap();
        assert_eq!(addrs, vec!["[::1]:9090".parse().unwrap()]);
    }
}
