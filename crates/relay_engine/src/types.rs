use std::fmt;

use relay_core::{BatchSummary, ItemState, MediaKind};

pub type SessionId = u64;

/// Pipeline step an in-flight item is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquiring,
    Normalizing,
    Partitioning,
    Delivering,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemProgress {
    pub session: SessionId,
    pub ordinal: usize,
    pub stage: Stage,
    pub bytes: u64,
    pub total: Option<u64>,
    pub percent: Option<f64>,
    /// Current worker budget during segmented acquisition.
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress(ItemProgress),
    ItemFinished(ItemReport),
    BatchFinished {
        session: SessionId,
        summary: BatchSummary,
    },
    /// The batch could not start at all.
    BatchRejected { session: SessionId, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub session: SessionId,
    pub ordinal: usize,
    pub title: String,
    pub url: String,
    pub kind: MediaKind,
    pub state: ItemState,
    pub outcome: ItemOutcome,
    /// Non-fatal observations, e.g. a source below the requested quality.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Delivered { parts: usize },
    Failed { kind: FailureKind, message: String },
    Skipped { platform: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Unsupported,
    Network,
    EmptyResult,
    InternalTool,
    PartialDelivery { uploaded: usize, total: usize },
    Delivery,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Unsupported => write!(f, "unsupported platform"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::EmptyResult => write!(f, "download produced no usable file"),
            FailureKind::InternalTool => write!(f, "media tool error"),
            FailureKind::PartialDelivery { uploaded, total } => {
                write!(f, "partial delivery ({uploaded}/{total} parts)")
            }
            FailureKind::Delivery => write!(f, "delivery failed"),
            FailureKind::Io => write!(f, "local file error"),
        }
    }
}
