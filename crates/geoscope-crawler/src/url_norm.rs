//! URL normalization and crawl-scope rules.
//!
//! The normalized string form of a URL is its identity throughout the
//! crawl: frontier membership, dedup, and page reports all use it.
//! Normalizing an already-normalized URL is the identity.

use geoscope_types::Result;
use url::Url;

/// Query keys stripped during normalization.
const TRACKING_KEYS: [&str; 2] = ["gclid", "fbclid"];

/// Extensions never enqueued.
const SKIP_EXTENSIONS: [&str; 14] = [
    "pdf", "zip", "png", "jpg", "jpeg", "gif", "svg", "ico", "css", "js", "mp3", "mp4", "woff",
    "woff2",
];

/// Normalize a URL: the `url` crate lowercases the host on parse; this
/// additionally strips the fragment, tracking query keys, and the
/// trailing slash on non-root paths.
pub fn normalize(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let kept: Vec<(String, String)> = normalized
        .query_pairs()
        .filter(|(key, _)| !is_tracking_key(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        normalized.set_query(None);
    } else {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        normalized.set_query(Some(&query));
    }

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
    }
    normalized
}

/// Parse and normalize in one step.
pub fn normalize_str(raw: &str) -> Result<Url> {
    Ok(normalize(&Url::parse(raw)?))
}

fn is_tracking_key(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_KEYS.contains(&key)
}

/// Same-origin means same host after normalization; scheme and port are
/// not considered. With `allow_subdomains`, `blog.example.com` is in
/// scope for `example.com`.
pub fn in_scope(host: &str, candidate: &Url, allow_subdomains: bool) -> bool {
    match candidate.host_str() {
        Some(candidate_host) => {
            candidate_host == host
                || (allow_subdomains && candidate_host.ends_with(&format!(".{}", host)))
        }
        None => false,
    }
}

/// Binary and asset extensions are never crawled.
pub fn has_skipped_extension(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    match path.rsplit_once('.') {
        Some((_, ext)) => SKIP_EXTENSIONS.contains(&ext),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        normalize_str(s).unwrap().to_string()
    }

    #[test]
    fn host_is_lowercased() {
        assert_eq!(norm("https://EXAMPLE.com/Path"), "https://example.com/Path");
    }

    #[test]
    fn fragment_is_stripped() {
        assert_eq!(norm("https://example.com/a#section"), "https://example.com/a");
    }

    #[test]
    fn tracking_keys_are_stripped() {
        assert_eq!(
            norm("https://example.com/a?utm_source=x&utm_medium=y&id=3&gclid=z&fbclid=w"),
            "https://example.com/a?id=3"
        );
    }

    #[test]
    fn trailing_slash_stripped_on_non_root() {
        assert_eq!(norm("https://example.com/a/"), "https://example.com/a");
        assert_eq!(norm("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_str("https://Example.com/Blog/?utm_campaign=x#top").unwrap();
        let twice = normalize(&once);
        assert_eq!(once, twice);
        assert_eq!(once.as_str(), "https://example.com/Blog");
    }

    #[test]
    fn scope_rules() {
        let same = Url::parse("https://example.com/x").unwrap();
        let sub = Url::parse("https://blog.example.com/x").unwrap();
        let other = Url::parse("https://other.com/x").unwrap();
        assert!(in_scope("example.com", &same, false));
        assert!(!in_scope("example.com", &sub, false));
        assert!(in_scope("example.com", &sub, true));
        assert!(!in_scope("example.com", &other, true));
    }

    #[test]
    fn asset_extensions_skipped() {
        for bad in [
            "https://example.com/doc.pdf",
            "https://example.com/img.PNG",
            "https://example.com/app.js",
        ] {
            assert!(has_skipped_extension(&Url::parse(bad).unwrap()), "{}", bad);
        }
        assert!(!has_skipped_extension(
            &Url::parse("https://example.com/page.html").unwrap()
        ));
        assert!(!has_skipped_extension(
            &Url::parse("https://example.com/page").unwrap()
        ));
    }
}
