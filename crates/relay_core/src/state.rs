use std::fmt;

use thiserror::Error;

/// Lifecycle of one item within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    Classified,
    Acquiring,
    Normalizing,
    Partitioning,
    Delivering,
    Succeeded,
    Failed,
    Skipped,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed | ItemState::Skipped)
    }

    /// Steps run strictly in order; any running step may fail, and only a freshly
    /// classified item may be skipped.
    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        match (self, next) {
            (Classified, Acquiring | Skipped) => true,
            (Acquiring, Normalizing) => true,
            (Normalizing, Partitioning) => true,
            (Partitioning, Delivering) => true,
            (Delivering, Succeeded) => true,
            (Classified | Acquiring | Normalizing | Partitioning | Delivering, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemState::Classified => "classified",
            ItemState::Acquiring => "acquiring",
            ItemState::Normalizing => "normalizing",
            ItemState::Partitioning => "partitioning",
            ItemState::Delivering => "delivering",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed => "failed",
            ItemState::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("illegal item transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: ItemState,
    pub to: ItemState,
}

/// Tracks the state of a single item and refuses out-of-order transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLifecycle {
    state: ItemState,
    history: Vec<ItemState>,
}

impl Default for ItemLifecycle {
    fn default() -> Self {
        Self {
            state: ItemState::Classified,
            history: vec![ItemState::Classified],
        }
    }
}

impl ItemLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn history(&self) -> &[ItemState] {
        &self.history
    }

    pub fn advance(&mut self, next: ItemState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("range '{0}' is not a number or 'a-b' pair")]
    Malformed(String),
    #[error("range starts at 0; indices are 1-based")]
    ZeroStart,
    #[error("range start {start} is after end {end}")]
    Reversed { start: usize, end: usize },
    #[error("range {start}-{end} does not overlap {len} items")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

/// 1-based inclusive selection over a session's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemRange {
    #[default]
    All,
    Span { start: usize, end: usize },
}

impl ItemRange {
    /// Accepts `"all"`, `"4"` or `"3-7"`.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("all") {
            return Ok(ItemRange::All);
        }
        let number = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| RangeError::Malformed(text.to_string()))
        };
        let (start, end) = match text.split_once('-') {
            Some((a, b)) => (number(a)?, number(b)?),
            None => {
                let n = number(text)?;
                (n, n)
            }
        };
        if start == 0 {
            return Err(RangeError::ZeroStart);
        }
        if start > end {
            return Err(RangeError::Reversed { start, end });
        }
        Ok(ItemRange::Span { start, end })
    }

    /// Zero-based half-open bounds for a list of `len` items. The end is clamped to `len`.
    pub fn resolve(self, len: usize) -> Result<(usize, usize), RangeError> {
        match self {
            ItemRange::All => Ok((0, len)),
            ItemRange::Span { start, end } => {
                if start > len {
                    return Err(RangeError::OutOfBounds { start, end, len });
                }
                Ok((start - 1, end.min(len)))
            }
        }
    }
}

impl fmt::Display for ItemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRange::All => f.write_str("all"),
            ItemRange::Span { start, end } if start == end => write!(f, "{start}"),
            ItemRange::Span { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

/// End-of-batch tallies. Emitted even when the batch was stopped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 1-based inclusive indices actually covered, if any item was selected.
    pub processed_range: Option<(usize, usize)>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn record(&mut self, state: ItemState) {
        match state {
            ItemState::Succeeded => self.succeeded += 1,
            ItemState::Failed => self.failed += 1,
            ItemState::Skipped => self.skipped += 1,
            _ => {}
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded={} failed={} skipped={}",
            self.succeeded, self.failed, self.skipped
        )?;
        if let Some((start, end)) = self.processed_range {
            write!(f, " range={start}-{end}")?;
        }
        if self.cancelled {
            f.write_str(" (stopped)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_is_only_reachable_from_classified() {
        assert!(ItemState::Classified.can_transition_to(ItemState::Skipped));
        assert!(!ItemState::Acquiring.can_transition_to(ItemState::Skipped));
        assert!(!ItemState::Succeeded.can_transition_to(ItemState::Failed));
    }
}
