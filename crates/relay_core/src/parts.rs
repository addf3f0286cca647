//! Stable naming for partitioned artifacts.
//!
//! A part of `clip.mp4` is called `clip_part002_of_005.mp4`. Any one part's name is enough to
//! rebuild the names of all its siblings.

const PART_MARKER: &str = "_part";
const OF_MARKER: &str = "_of_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartName {
    pub stem: String,
    /// 1-based.
    pub index: usize,
    pub total: usize,
    /// Includes the leading dot, or is empty.
    pub extension: String,
}

impl PartName {
    pub fn file_name(&self) -> String {
        part_file_name(&self.stem, &self.extension, self.index, self.total)
    }

    /// File names of every part in the set, in order.
    pub fn siblings(&self) -> Vec<String> {
        (1..=self.total)
            .map(|i| part_file_name(&self.stem, &self.extension, i, self.total))
            .collect()
    }
}

pub fn part_file_name(stem: &str, extension: &str, index: usize, total: usize) -> String {
    format!("{stem}{PART_MARKER}{index:03}{OF_MARKER}{total:03}{extension}")
}

/// Split a file name into stem and extension (`"a.b.mp4"` → `("a.b", ".mp4")`).
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(0) | None => (file_name, ""),
        Some(dot) => file_name.split_at(dot),
    }
}

pub fn parse_part_name(file_name: &str) -> Option<PartName> {
    let (body, extension) = split_extension(file_name);
    let part_at = body.rfind(PART_MARKER)?;
    let stem = &body[..part_at];
    let counters = &body[part_at + PART_MARKER.len()..];
    let (index, total) = counters.split_once(OF_MARKER)?;
    if !is_counter(index) || !is_counter(total) {
        return None;
    }
    let index: usize = index.parse().ok()?;
    let total: usize = total.parse().ok()?;
    if index == 0 || total == 0 || index > total {
        return None;
    }
    Some(PartName {
        stem: stem.to_string(),
        index,
        total,
        extension: extension.to_string(),
    })
}

fn is_counter(text: &str) -> bool {
    text.len() >= 3 && text.bytes().all(|b| b.is_ascii_digit())
}

/// Number of parts needed so that none exceeds `ceiling_bytes`.
pub fn part_count(size_bytes: u64, ceiling_bytes: u64) -> usize {
    if ceiling_bytes == 0 || size_bytes <= ceiling_bytes {
        return 1;
    }
    size_bytes.div_ceil(ceiling_bytes) as usize
}

pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

pub fn ceiling_bytes(ceiling_mb: u64) -> u64 {
    ceiling_mb.saturating_mul(1024 * 1024)
}
