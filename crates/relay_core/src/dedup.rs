use std::collections::{BTreeMap, HashSet};

use relay_logging::{relay_error, relay_info, relay_warn};
use thiserror::Error;

use crate::normalize::{fingerprint_normalized, normalize_url, Fingerprint};
use crate::reference::Reference;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparisonResult {
    /// NEW-only references, ascending by fingerprint.
    pub new_items: Vec<Reference>,
    pub old_count: usize,
    pub new_count: usize,
    pub common_count: usize,
    pub new_only_count: usize,
    pub old_only_count: usize,
    pub duplicate_in_old: usize,
    pub duplicate_in_new: usize,
}

/// Internal-consistency violation detected after a comparison. Always fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("result has {result} items but the new list only has {new_count}")]
    ResultLargerThanNew { result: usize, new_count: usize },
    #[error("result item {url} is not present in the new list")]
    NotInNew { url: String },
    #[error("result item {url} is already present in the old list")]
    PresentInOld { url: String },
}

/// Compute the references of `new` whose links do not occur in `old`.
///
/// The returned references are ordered by fingerprint and keep their NEW-list ordinal.
/// The result is validated before it is returned.
pub fn compare(
    old: &[Reference],
    new: &[Reference],
) -> Result<(Vec<Reference>, ComparisonResult), ValidationFailure> {
    let old_map = index_by_fingerprint(old);
    let new_map = index_by_fingerprint(new);

    let common_count = new_map.keys().filter(|fp| old_map.contains_key(fp)).count();
    let old_only_count = old_map.keys().filter(|fp| !new_map.contains_key(fp)).count();
    let new_items: Vec<Reference> = new_map
        .iter()
        .filter(|(fp, _)| !old_map.contains_key(fp))
        .map(|(_, reference)| reference.clone())
        .collect();

    let result = ComparisonResult {
        new_items: new_items.clone(),
        old_count: old.len(),
        new_count: new.len(),
        common_count,
        new_only_count: new_items.len(),
        old_only_count,
        duplicate_in_old: old.len() - old_map.len(),
        duplicate_in_new: new.len() - new_map.len(),
    };
    log_statistics(&result);

    validate_comparison(old, new, &new_items)?;
    Ok((new_items, result))
}

/// Check that `result` is a plausible NEW\OLD difference.
pub fn validate_comparison(
    old: &[Reference],
    new: &[Reference],
    result: &[Reference],
) -> Result<(), ValidationFailure> {
    if result.len() > new.len() {
        relay_error!("Comparison validation failed: result larger than new list");
        return Err(ValidationFailure::ResultLargerThanNew {
            result: result.len(),
            new_count: new.len(),
        });
    }

    let new_urls: HashSet<String> = new.iter().map(|r| normalize_url(&r.url)).collect();
    let old_urls: HashSet<String> = old.iter().map(|r| normalize_url(&r.url)).collect();

    for reference in result {
        let normalized = normalize_url(&reference.url);
        if !new_urls.contains(&normalized) {
            relay_error!("Comparison validation failed: {} not in new list", reference.url);
            return Err(ValidationFailure::NotInNew {
                url: reference.url.clone(),
            });
        }
        if old_urls.contains(&normalized) {
            relay_error!("Comparison validation failed: {} found in old list", reference.url);
            return Err(ValidationFailure::PresentInOld {
                url: reference.url.clone(),
            });
        }
    }
    relay_info!("Comparison validation passed");
    Ok(())
}

/// Later duplicates overwrite earlier ones.
fn index_by_fingerprint(references: &[Reference]) -> BTreeMap<Fingerprint, Reference> {
    let mut map = BTreeMap::new();
    for reference in references {
        let fp = fingerprint_normalized(&normalize_url(&reference.url));
        map.insert(fp, reference.clone());
    }
    map
}

fn log_statistics(result: &ComparisonResult) {
    relay_info!(
        "Comparison: old={} new={} common={} new_only={} old_only={}",
        result.old_count,
        result.new_count,
        result.common_count,
        result.new_only_count,
        result.old_only_count
    );
    if result.duplicate_in_old > 0 {
        relay_warn!("Duplicates in old list: {}", result.duplicate_in_old);
    }
    if result.duplicate_in_new > 0 {
        relay_warn!("Duplicates in new list: {}", result.duplicate_in_new);
    }
}
