//! Throughput-driven fragment concurrency for segmented acquisition.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use relay_logging::relay_info;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerBudgetSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    pub default_workers: usize,
    /// Minimum time between two evaluations.
    pub adjust_interval: Duration,
    /// Number of samples in the moving average.
    pub window: usize,
    pub increase_step: usize,
    pub decrease_step: usize,
    pub increase_ratio: f64,
    pub decrease_ratio: f64,
}

impl Default for WorkerBudgetSettings {
    fn default() -> Self {
        Self {
            min_workers: 8,
            max_workers: 32,
            default_workers: 16,
            adjust_interval: Duration::from_secs(5),
            window: 5,
            increase_step: 4,
            decrease_step: 2,
            increase_ratio: 1.2,
            decrease_ratio: 0.8,
        }
    }
}

/// Current worker count plus the state needed to re-evaluate it.
///
/// The count always stays within `[min_workers, max_workers]`.
#[derive(Debug, Clone)]
pub struct WorkerBudget {
    settings: WorkerBudgetSettings,
    current: usize,
    previous_average: f64,
    last_adjust: Instant,
    samples: VecDeque<f64>,
}

impl WorkerBudget {
    pub fn new(settings: WorkerBudgetSettings, now: Instant) -> Self {
        let min = settings.min_workers.max(1);
        let max = settings.max_workers.max(min);
        let settings = WorkerBudgetSettings {
            min_workers: min,
            max_workers: max,
            window: settings.window.max(1),
            ..settings
        };
        let current = settings.default_workers.clamp(min, max);
        Self {
            samples: VecDeque::with_capacity(settings.window),
            settings,
            current,
            previous_average: 0.0,
            last_adjust: now,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.settings.min_workers, self.settings.max_workers)
    }

    /// Feed one throughput sample in bytes per second and return the resulting budget.
    ///
    /// Samples arriving sooner than `adjust_interval` after the last evaluation are ignored.
    pub fn observe(&mut self, bytes_per_sec: f64, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_adjust) < self.settings.adjust_interval {
            return self.current;
        }
        let sample = if bytes_per_sec.is_finite() {
            bytes_per_sec.max(0.0)
        } else {
            0.0
        };

        self.samples.push_back(sample);
        while self.samples.len() > self.settings.window {
            self.samples.pop_front();
        }
        let average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;

        let (min, max) = self.bounds();
        if average > self.previous_average * self.settings.increase_ratio && self.current < max {
            self.current = (self.current + self.settings.increase_step).min(max);
            relay_info!("Workers -> {} (avg {:.0} B/s)", self.current, average);
        } else if average < self.previous_average * self.settings.decrease_ratio
            && self.current > min
        {
            self.current = self.current.saturating_sub(self.settings.decrease_step).max(min);
            relay_info!("Workers -> {} (avg {:.0} B/s)", self.current, average);
        }

        self.previous_average = average;
        self.last_adjust = now;
        self.current
    }
}
