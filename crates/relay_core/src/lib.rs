//! Relay core: IO-free reference handling, dedup and pipeline bookkeeping.
mod budget;
mod caption;
mod classify;
mod dedup;
mod normalize;
mod parts;
mod progress;
mod quality;
mod reference;
mod state;

pub use budget::{WorkerBudget, WorkerBudgetSettings};
pub use caption::{item_caption, part_caption};
pub use classify::{is_single_site_video, Classification, PlatformPolicy};
pub use dedup::{compare, validate_comparison, ComparisonResult, ValidationFailure};
pub use normalize::{fingerprint, normalize_url, Fingerprint};
pub use parts::{
    ceiling_bytes, megabytes, parse_part_name, part_count, part_file_name, split_extension,
    PartName,
};
pub use progress::{percent, ProgressThrottle};
pub use quality::{FormatChoice, FormatSelector, QualityPreset, QualityTable};
pub use reference::{
    lowercase_extension, parse_reference_list, KindPattern, KindTable, MediaKind, Reference,
};
pub use state::{
    BatchSummary, IllegalTransition, ItemLifecycle, ItemRange, ItemState, RangeError,
};
