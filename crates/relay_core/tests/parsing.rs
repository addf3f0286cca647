use pretty_assertions::assert_eq;
use relay_core::{
    is_single_site_video, parse_reference_list, Classification, KindPattern, KindTable, MediaKind,
    PlatformPolicy, Reference,
};

#[test]
fn accepts_known_kinds_and_drops_the_rest() {
    let text = "\
Intro: https://cdn.example/intro.MP4
Cover: https://cdn.example/cover.jpg?size=large
Notes without link
Manual: https://cdn.example/manual.pdf
Page: https://cdn.example/index.html
Stream: https://cdn.example/live/manifest.m3u8
";
    let refs = parse_reference_list(text, &KindTable::default());
    assert_eq!(
        refs,
        vec![
            Reference::new("Intro", "https://cdn.example/intro.MP4", MediaKind::Video, 1),
            Reference::new(
                "Cover",
                "https://cdn.example/cover.jpg?size=large",
                MediaKind::Image,
                2
            ),
            Reference::new("Manual", "https://cdn.example/manual.pdf", MediaKind::Document, 3),
            Reference::new(
                "Stream",
                "https://cdn.example/live/manifest.m3u8",
                MediaKind::Video,
                4
            ),
        ]
    );
}

#[test]
fn single_site_links_are_videos() {
    let refs = parse_reference_list(
        "Talk: https://www.youtube.com/watch?v=abc123",
        &KindTable::default(),
    );
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].kind, MediaKind::Video);
    assert!(is_single_site_video("https://youtu.be/abc123"));
    assert!(is_single_site_video("https://m.youtube.com/shorts/xyz"));
    assert!(!is_single_site_video("https://www.youtube.com/feed/trending"));
}

#[test]
fn custom_kind_table_is_honoured() {
    let kinds = KindTable::new(vec![(
        MediaKind::Document,
        vec![KindPattern::Extension(".epub".to_string())],
    )]);
    let refs = parse_reference_list(
        "Book: https://x.example/b.epub\nClip: https://x.example/c.mp4",
        &kinds,
    );
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].kind, MediaKind::Document);
}

#[test]
fn platform_policy_flags_manual_only_hosts() {
    let policy = PlatformPolicy::default();
    let social = Reference::new("p", "https://www.instagram.com/p/xyz.mp4", MediaKind::Video, 1);
    let tube = Reference::new("t", "https://youtu.be/abc", MediaKind::Video, 2);
    let plain = Reference::new("c", "https://cdn.example/c.mp4", MediaKind::Video, 3);

    assert_eq!(
        policy.classify(&social),
        Classification::ManualOnly {
            platform: "instagram.com".to_string()
        }
    );
    assert_eq!(
        policy.classify(&tube),
        Classification::ManualOnly {
            platform: "YouTube".to_string()
        }
    );
    assert_eq!(policy.classify(&plain), Classification::Process);
}
