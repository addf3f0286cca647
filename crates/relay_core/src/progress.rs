use std::time::{Duration, Instant};

/// Rate limiter for progress updates: an update is let through only when both enough time
/// has passed and the percentage moved far enough since the last one.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    min_percent_delta: f64,
    last: Option<(Instant, f64)>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration, min_percent_delta: f64) -> Self {
        Self {
            min_interval,
            min_percent_delta,
            last: None,
        }
    }

    /// Returns the percentage to show, or `None` if this update should be dropped.
    /// Completion is always let through once.
    pub fn should_emit(&mut self, current: u64, total: u64, now: Instant) -> Option<f64> {
        let percent = percent(current, total)?;
        let emit = match self.last {
            None => true,
            Some((_, last_percent)) if percent >= 100.0 => last_percent < 100.0,
            Some((at, last_percent)) => {
                now.saturating_duration_since(at) >= self.min_interval
                    && percent - last_percent >= self.min_percent_delta
            }
        };
        if emit {
            self.last = Some((now, percent));
            Some(percent)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

pub fn percent(current: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((current.min(total) as f64 / total as f64) * 100.0)
}
