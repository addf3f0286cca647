use std::sync::{mpsc, Mutex};
use std::time::Instant;

use relay_core::{percent, ProgressThrottle};

use crate::{EngineEvent, ItemProgress, SessionId, Stage};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Byte-level progress of one transfer (download or upload).
pub trait TransferObserver: Send + Sync {
    fn on_progress(&self, transferred: u64, total: Option<u64>);

    fn on_workers(&self, _workers: usize) {}
}

/// Observer that ignores everything.
pub struct NoProgress;

impl TransferObserver for NoProgress {
    fn on_progress(&self, _transferred: u64, _total: Option<u64>) {}
}

/// Forwards transfer progress of one item to a [`ProgressSink`] as [`EngineEvent::Progress`].
pub struct ItemObserver<'a> {
    sink: &'a dyn ProgressSink,
    session: SessionId,
    ordinal: usize,
    stage: Stage,
    throttle: Option<Mutex<ProgressThrottle>>,
    workers: Mutex<Option<usize>>,
}

impl<'a> ItemObserver<'a> {
    pub fn new(sink: &'a dyn ProgressSink, session: SessionId, ordinal: usize, stage: Stage) -> Self {
        Self {
            sink,
            session,
            ordinal,
            stage,
            throttle: None,
            workers: Mutex::new(None),
        }
    }

    pub fn throttled(mut self, throttle: ProgressThrottle) -> Self {
        self.throttle = Some(Mutex::new(throttle));
        self
    }

    fn current_workers(&self) -> Option<usize> {
        *self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TransferObserver for ItemObserver<'_> {
    fn on_progress(&self, transferred: u64, total: Option<u64>) {
        let shown = match (&self.throttle, total) {
            (Some(throttle), Some(total)) => {
                let mut throttle = throttle.lock().unwrap_or_else(|e| e.into_inner());
                match throttle.should_emit(transferred, total, Instant::now()) {
                    Some(p) => Some(p),
                    None => return,
                }
            }
            (_, Some(total)) => percent(transferred, total),
            (_, None) => None,
        };
        self.sink.emit(EngineEvent::Progress(ItemProgress {
            session: self.session,
            ordinal: self.ordinal,
            stage: self.stage,
            bytes: transferred,
            total,
            percent: shown,
            workers: self.current_workers(),
        }));
    }

    fn on_workers(&self, workers: usize) {
        *self.workers.lock().unwrap_or_else(|e| e.into_inner()) = Some(workers);
    }
}
