use url::Url;

use crate::reference::Reference;

/// Hosts whose content cannot be fetched automatically.
const DEFAULT_UNSUPPORTED_HOSTS: &[&str] = &[
    "instagram.com",
    "facebook.com",
    "fb.watch",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "snapchat.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Process,
    /// Needs a human; `platform` names what was recognised.
    ManualOnly { platform: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPolicy {
    pub unsupported_hosts: Vec<String>,
    pub skip_single_site: bool,
}

impl Default for PlatformPolicy {
    fn default() -> Self {
        Self {
            unsupported_hosts: DEFAULT_UNSUPPORTED_HOSTS
                .iter()
                .map(|h| (*h).to_string())
                .collect(),
            skip_single_site: true,
        }
    }
}

impl PlatformPolicy {
    pub fn classify(&self, reference: &Reference) -> Classification {
        if self.skip_single_site && is_single_site_video(&reference.url) {
            return Classification::ManualOnly {
                platform: "YouTube".to_string(),
            };
        }
        let Some(host) = host_of(&reference.url) else {
            return Classification::Process;
        };
        match self
            .unsupported_hosts
            .iter()
            .find(|blocked| host_matches(&host, blocked))
        {
            Some(blocked) => Classification::ManualOnly {
                platform: blocked.clone(),
            },
            None => Classification::Process,
        }
    }
}

/// YouTube watch, shorts, embed and short-link URLs.
pub fn is_single_site_video(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return false;
    };
    let path = parsed.path();
    if host_matches(&host, "youtu.be") {
        return path.len() > 1;
    }
    if !host_matches(&host, "youtube.com") {
        return false;
    }
    if path == "/watch" {
        return parsed.query_pairs().any(|(k, _)| k == "v");
    }
    ["/embed/", "/v/", "/shorts/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::host_matches;

    #[test]
    fn subdomains_match_but_lookalikes_do_not() {
        assert!(host_matches("www.x.com", "x.com"));
        assert!(host_matches("x.com", "x.com"));
        assert!(!host_matches("box.com", "x.com"));
    }
}
