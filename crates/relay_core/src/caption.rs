use crate::parts::megabytes;
use crate::reference::Reference;

/// `"{ordinal}. {title}"`, followed by a blank line and `custom` when given.
pub fn item_caption(reference: &Reference, custom: Option<&str>) -> String {
    let mut caption = format!("{}. {}", reference.ordinal, reference.title);
    if let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) {
        caption.push_str("\n\n");
        caption.push_str(custom);
    }
    caption
}

pub fn part_caption(base: &str, index: usize, total: usize, size_bytes: u64) -> String {
    format!(
        "{base}\n\nPart {index}/{total} ({:.1} MB)",
        megabytes(size_bytes)
    )
}
