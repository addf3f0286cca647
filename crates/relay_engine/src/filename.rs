use relay_core::{lowercase_extension, MediaKind, Reference};
use sha2::{Digest, Sha256};

/// Filesystem-safe, deterministic stem: `{ordinal:03}_{sanitized_title}--{short_hash(url)}`.
pub fn artifact_stem(reference: &Reference) -> String {
    let title = if reference.title.trim().is_empty() {
        "untitled"
    } else {
        reference.title.as_str()
    };
    format!(
        "{:03}_{}--{}",
        reference.ordinal,
        sanitize_title(title),
        short_hash(&reference.url)
    )
}

/// Extension taken from the URL path when present, otherwise a default for the kind.
pub fn artifact_extension(reference: &Reference) -> String {
    match lowercase_extension(&reference.url) {
        Some(ext) if ext.len() <= 6 && !is_manifest_extension(&ext) => ext,
        _ => match reference.kind {
            MediaKind::Video => ".mp4".to_string(),
            MediaKind::Image => ".jpg".to_string(),
            MediaKind::Document => ".bin".to_string(),
        },
    }
}

fn is_manifest_extension(ext: &str) -> bool {
    matches!(ext, ".m3u8" | ".mpd")
}

fn sanitize_title(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' || c == ' ' {
            if !prev_underscore {
                compacted.push('_');
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut name: String = compacted.chars().take(60).collect();
    if name.is_empty() {
        name = "untitled".to_string();
    }
    name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '\0'..='\u{1F}'
    )
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_is_sanitized_and_stable() {
        let reference = Reference::new(
            "My: clip / final?",
            "https://x.example/a.mp4",
            MediaKind::Video,
            7,
        );
        let stem = artifact_stem(&reference);
        assert!(stem.starts_with("007_My_clip_final--"));
        assert_eq!(stem, artifact_stem(&reference));
    }

    #[test]
    fn manifest_links_default_to_mp4() {
        let reference = Reference::new("s", "https://x.example/live.m3u8", MediaKind::Video, 1);
        assert_eq!(artifact_extension(&reference), ".mp4");
        let doc = Reference::new("d", "https://x.example/d.PDF?x=1", MediaKind::Document, 1);
        assert_eq!(artifact_extension(&doc), ".pdf");
    }
}
