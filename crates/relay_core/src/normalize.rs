//! URL canonicalization used to decide whether two references are the same link.
//!
//! Normalization never fails: input that does not parse as a URL degrades to a trimmed,
//! lower-cased copy of itself. The result is idempotent.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use url::Url;

/// Fixed-length digest of a normalized reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        self.to_string()[..8].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Canonical comparable form of `url`.
///
/// Lower-cases scheme and host (scheme defaults to `https`), strips trailing path slashes
/// unless the path is the root, keeps the first value of each query key with keys sorted,
/// and drops the fragment.
pub fn normalize_url(url: &str) -> String {
    let decoded = decode_fully(url.trim());
    let candidate = if decoded.contains("://") {
        decoded.clone()
    } else {
        format!("https://{decoded}")
    };

    match Url::parse(&candidate) {
        Ok(parsed) if parsed.has_host() => canonicalize(parsed),
        _ => decoded.to_lowercase(),
    }
}

/// SHA-256 of the normalized form of `url`.
pub fn fingerprint(url: &str) -> Fingerprint {
    fingerprint_normalized(&normalize_url(url))
}

pub(crate) fn fingerprint_normalized(normalized: &str) -> Fingerprint {
    let digest = Sha256::digest(normalized.as_bytes());
    Fingerprint(digest.into())
}

fn canonicalize(mut url: Url) -> String {
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        url.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }

    let query = url.query().map(sort_query);
    match query.as_deref() {
        Some(q) if !q.is_empty() => url.set_query(Some(q)),
        _ => url.set_query(None),
    }

    url.to_string()
}

fn sort_query(query: &str) -> String {
    let mut params: BTreeMap<&str, &str> = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.entry(key).or_insert(value);
    }
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode until nothing changes. A changing pass either shortens the string or removes a
/// `%` (invalid bytes become U+FFFD), so the loop terminates.
fn decode_fully(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = percent_decode_str(&current).decode_utf8_lossy().into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
