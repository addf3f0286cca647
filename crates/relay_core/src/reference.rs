use std::fmt;

use url::Url;

use crate::classify::is_single_site_video;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Video,
    Image,
    Document,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::Document => "document",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One accepted entry of an input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub url: String,
    pub kind: MediaKind,
    /// 1-based position among the accepted lines of the originating list.
    pub ordinal: usize,
}

impl Reference {
    pub fn new(title: impl Into<String>, url: impl Into<String>, kind: MediaKind, ordinal: usize) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            kind,
            ordinal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindPattern {
    /// Matches when the URL path ends with the given suffix, e.g. `.mp4`.
    Extension(String),
    /// Matches when the URL path contains the fragment anywhere, e.g. `/manifest.`.
    PathFragment(String),
}

impl KindPattern {
    fn matches(&self, path: &str) -> bool {
        match self {
            KindPattern::Extension(ext) => path.trim_end_matches('/').ends_with(ext.as_str()),
            KindPattern::PathFragment(fragment) => path.contains(fragment.as_str()),
        }
    }
}

/// Ordered table mapping URL shapes to media kinds. The first matching kind wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindTable {
    entries: Vec<(MediaKind, Vec<KindPattern>)>,
}

impl KindTable {
    pub fn new(entries: Vec<(MediaKind, Vec<KindPattern>)>) -> Self {
        Self { entries }
    }

    pub fn classify(&self, url: &str) -> Option<MediaKind> {
        if is_single_site_video(url) {
            return Some(MediaKind::Video);
        }
        let path = lowercase_path(url);
        self.entries
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.matches(&path)))
            .map(|(kind, _)| *kind)
    }
}

impl Default for KindTable {
    fn default() -> Self {
        let ext = |list: &[&str]| {
            list.iter()
                .map(|e| KindPattern::Extension((*e).to_string()))
                .collect::<Vec<_>>()
        };

        let mut video = ext(&[
            ".m3u8", ".mpd", ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v",
            ".3gp", ".ogv", ".ts", ".mts", ".m2ts", ".vob", ".divx", ".xvid",
        ]);
        video.push(KindPattern::PathFragment("/manifest.".to_string()));

        Self::new(vec![
            (MediaKind::Video, video),
            (
                MediaKind::Image,
                ext(&[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".svg"]),
            ),
            (
                MediaKind::Document,
                ext(&[".pdf", ".doc", ".docx", ".txt", ".zip", ".rar"]),
            ),
        ])
    }
}

/// Path component of `url`, lower-cased, without query or fragment.
pub(crate) fn lowercase_path(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => {
            let lower = url.trim().to_ascii_lowercase();
            let end = lower.find(['?', '#']).unwrap_or(lower.len());
            lower[..end].to_string()
        }
    }
}

/// Extension of the URL path including its dot, lower-cased (`".mp4"`).
pub fn lowercase_extension(url: &str) -> Option<String> {
    let path = lowercase_path(url);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let dot = last.rfind('.')?;
    let ext = &last[dot..];
    (ext.len() > 1).then(|| ext.to_string())
}

/// Parse newline-delimited `title: url` pairs.
///
/// A line is accepted when it contains a colon and an `http://`/`https://` URL whose kind
/// is known. Everything else is dropped silently.
pub fn parse_reference_list(text: &str, kinds: &KindTable) -> Vec<Reference> {
    let mut references = Vec::new();
    for line in text.lines() {
        let Some((title, url)) = split_line(line) else {
            continue;
        };
        let Some(kind) = kinds.classify(url) else {
            continue;
        };
        let ordinal = references.len() + 1;
        references.push(Reference::new(title, url, kind, ordinal));
    }
    references
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if !line.contains(':') {
        return None;
    }
    let lower = line.to_ascii_lowercase();
    let start = match (lower.find("http://"), lower.find("https://")) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let url = line[start..].trim();
    let title = line[..start].trim().trim_end_matches(':').trim();
    if url.is_empty() {
        return None;
    }
    Some((title, url))
}

#[cfg(test)]
mod tests {
    use super::split_line;

    #[test]
    fn title_keeps_inner_colons() {
        assert_eq!(
            split_line("Part 1: Intro: https://a.example/x.mp4"),
            Some(("Part 1: Intro", "https://a.example/x.mp4"))
        );
    }

    #[test]
    fn bare_url_has_empty_title() {
        assert_eq!(
            split_line("https://a.example/x.mp4"),
            Some(("", "https://a.example/x.mp4"))
        );
    }

    #[test]
    fn scheme_match_ignores_case() {
        assert_eq!(
            split_line("Dup: HTTPS://EXAMPLE.COM/v1.mp4/"),
            Some(("Dup", "HTTPS://EXAMPLE.COM/v1.mp4/"))
        );
    }

    #[test]
    fn line_without_url_is_rejected() {
        assert_eq!(split_line("Notes: nothing here"), None);
    }
}
