//! Session registry and the sequential batch driver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use relay_core::{
    compare, item_caption, BatchSummary, Classification, ComparisonResult, ItemLifecycle,
    ItemRange, ItemState, MediaKind, PlatformPolicy, ProgressThrottle, QualityPreset,
    QualityTable, RangeError, Reference, ValidationFailure,
};
use relay_logging::{relay_error, relay_info, relay_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::acquire::{AcquisitionController, AcquisitionError};
use crate::artifact::ArtifactNormalizer;
use crate::config::EngineConfig;
use crate::deliver::{DeliveryError, DeliveryPipeline, DeliveryRequest, Notice, Transport};
use crate::fetch::Fetcher;
use crate::partition::Partitioner;
use crate::persist::{ensure_dir, remove_dir_quietly, remove_quietly, session_dir, PersistError};
use crate::toolchain::MediaToolchain;
use crate::{
    EngineEvent, FailureKind, ItemObserver, ItemOutcome, ItemProgress, ItemReport, ProgressSink,
    SessionId, Stage,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub range: ItemRange,
    /// Quality label; the table default when unset.
    pub quality: Option<String>,
    pub custom_caption: Option<String>,
    pub watermark: Option<String>,
}

struct Session {
    items: Vec<Reference>,
    options: SessionOptions,
    cancel: CancellationToken,
}

/// Live sessions keyed by id. A session exists from ingestion until its batch ends.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn open(&self, items: Vec<Reference>) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        relay_info!("Session {id} opened with {} items", items.len());
        self.lock().insert(
            id,
            Session {
                items,
                options: SessionOptions::default(),
                cancel: CancellationToken::new(),
            },
        );
        id
    }

    /// Open a session over the items of `new` that are absent from `old`.
    ///
    /// No session is created when nothing is new. A failed validation is returned as is.
    pub fn open_compared(
        &self,
        old: &[Reference],
        new: &[Reference],
    ) -> Result<(Option<SessionId>, ComparisonResult), ValidationFailure> {
        let (mut items, stats) = compare(old, new)?;
        if items.is_empty() {
            relay_info!("No new items, no session opened");
            return Ok((None, stats));
        }
        items.sort_by_key(|r| r.ordinal);
        Ok((Some(self.open(items)), stats))
    }

    pub fn configure(&self, id: SessionId, options: SessionOptions) -> bool {
        match self.lock().get_mut(&id) {
            Some(session) => {
                session.options = options;
                true
            }
            None => false,
        }
    }

    pub fn items(&self, id: SessionId) -> Option<Vec<Reference>> {
        self.lock().get(&id).map(|s| s.items.clone())
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Request a stop. The running batch notices before its next item or chunk.
    pub fn cancel(&self, id: SessionId) -> bool {
        match self.lock().get(&id) {
            Some(session) => {
                relay_info!("Session {id} cancel requested");
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn close(&self, id: SessionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn snapshot(&self, id: SessionId) -> Option<(Vec<Reference>, SessionOptions, CancellationToken)> {
        self.lock()
            .get(&id)
            .map(|s| (s.items.clone(), s.options.clone(), s.cancel.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("unknown quality '{0}'")]
    UnknownQuality(String),
    #[error(transparent)]
    WorkDir(#[from] PersistError),
}

enum StepError {
    Cancelled,
    Failed { kind: FailureKind, message: String },
}

impl StepError {
    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        StepError::Failed {
            kind,
            message: message.into(),
        }
    }
}

impl From<AcquisitionError> for StepError {
    fn from(err: AcquisitionError) -> Self {
        match err.failure_kind() {
            None => StepError::Cancelled,
            Some(kind) => StepError::failed(kind, err.to_string()),
        }
    }
}

struct ItemContext<'a> {
    session: SessionId,
    quality: &'a QualityPreset,
    options: &'a SessionOptions,
    cancel: &'a CancellationToken,
    dir: &'a Path,
    events: &'a dyn ProgressSink,
}

pub struct BatchOrchestrator {
    registry: Arc<SessionRegistry>,
    acquirer: AcquisitionController,
    normalizer: ArtifactNormalizer,
    partitioner: Partitioner,
    delivery: DeliveryPipeline,
    transport: Arc<dyn Transport>,
    policy: PlatformPolicy,
    qualities: QualityTable,
    work_dir: PathBuf,
    progress_throttle: ProgressThrottle,
}

impl BatchOrchestrator {
    pub fn new(
        config: &EngineConfig,
        registry: Arc<SessionRegistry>,
        fetcher: Arc<dyn Fetcher>,
        toolchain: Arc<dyn MediaToolchain>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            acquirer: AcquisitionController::new(
                fetcher,
                toolchain.clone(),
                config.acquire.clone(),
                config.budget.clone(),
            ),
            normalizer: ArtifactNormalizer::new(toolchain.clone()),
            partitioner: Partitioner::new(toolchain.clone(), &config.partition),
            delivery: DeliveryPipeline::new(
                transport.clone(),
                toolchain,
                config.delivery.clone(),
            ),
            transport,
            policy: config.platforms.clone(),
            qualities: config.qualities.clone(),
            work_dir: config.work_dir.clone(),
            progress_throttle: ProgressThrottle::new(
                config.delivery.progress_interval,
                config.delivery.progress_min_percent_delta,
            ),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Process the session's selected items one at a time, then close the session.
    ///
    /// Item failures never abort the batch. The summary is emitted as
    /// [`EngineEvent::BatchFinished`] even when the batch was stopped.
    pub async fn run_batch(
        &self,
        session: SessionId,
        events: &dyn ProgressSink,
    ) -> Result<BatchSummary, BatchError> {
        let result = self.run_items(session, events).await;
        self.registry.close(session);
        let summary = result?;
        relay_info!("Session {session} finished: {summary}");
        events.emit(EngineEvent::BatchFinished {
            session,
            summary: summary.clone(),
        });
        Ok(summary)
    }

    async fn run_items(
        &self,
        session: SessionId,
        events: &dyn ProgressSink,
    ) -> Result<BatchSummary, BatchError> {
        let (items, options, cancel) = self
            .registry
            .snapshot(session)
            .ok_or(BatchError::UnknownSession(session))?;
        let quality = match options.quality.as_deref() {
            Some(label) => self.qualities.get(label),
            None => self.qualities.default_preset(),
        }
        .cloned()
        .ok_or_else(|| BatchError::UnknownQuality(options.quality.clone().unwrap_or_default()))?;
        let (start, end) = options.range.resolve(items.len())?;

        let dir = session_dir(&self.work_dir, session);
        ensure_dir(&dir)?;
        relay_info!(
            "Session {session}: items {}-{} of {} at {}",
            start + 1,
            end,
            items.len(),
            quality.label
        );

        let ctx = ItemContext {
            session,
            quality: &quality,
            options: &options,
            cancel: &cancel,
            dir: &dir,
            events,
        };
        let mut summary = BatchSummary::default();
        let mut last_attempted = None;
        for (index, reference) in items.iter().enumerate().take(end).skip(start) {
            if cancel.is_cancelled() {
                break;
            }
            last_attempted = Some(index + 1);
            if let Some(report) = self.process_item(&ctx, reference).await {
                summary.record(report.state);
                events.emit(EngineEvent::ItemFinished(report));
            }
        }
        summary.cancelled = cancel.is_cancelled();
        summary.processed_range = last_attempted.map(|last| (start + 1, last));

        remove_dir_quietly(&dir).await;
        Ok(summary)
    }

    /// `None` when the item was abandoned because of cancellation.
    async fn process_item(&self, ctx: &ItemContext<'_>, reference: &Reference) -> Option<ItemReport> {
        let mut lifecycle = ItemLifecycle::new();
        let mut warnings = Vec::new();

        if let Classification::ManualOnly { platform } = self.policy.classify(reference) {
            relay_info!("#{} needs manual handling ({platform})", reference.ordinal);
            self.notify(&Notice::ManualAction {
                ordinal: reference.ordinal,
                title: reference.title.clone(),
                url: reference.url.clone(),
                platform: platform.clone(),
            })
            .await;
            advance(&mut lifecycle, ItemState::Skipped);
            return Some(report(ctx, reference, &lifecycle, ItemOutcome::Skipped { platform }, warnings));
        }

        let outcome = match self
            .run_steps(ctx, reference, &mut lifecycle, &mut warnings)
            .await
        {
            Ok(parts) => {
                advance(&mut lifecycle, ItemState::Succeeded);
                ItemOutcome::Delivered { parts }
            }
            Err(StepError::Cancelled) => {
                relay_info!("#{} abandoned, session stopping", reference.ordinal);
                return None;
            }
            Err(StepError::Failed { kind, message }) => {
                relay_warn!("#{} failed: {kind}: {message}", reference.ordinal);
                advance(&mut lifecycle, ItemState::Failed);
                self.notify(&Notice::FailedLink {
                    ordinal: reference.ordinal,
                    title: reference.title.clone(),
                    url: reference.url.clone(),
                    kind: reference.kind,
                    reason: kind.to_string(),
                })
                .await;
                ItemOutcome::Failed { kind, message }
            }
        };
        Some(report(ctx, reference, &lifecycle, outcome, warnings))
    }

    async fn run_steps(
        &self,
        ctx: &ItemContext<'_>,
        reference: &Reference,
        lifecycle: &mut ItemLifecycle,
        warnings: &mut Vec<String>,
    ) -> Result<usize, StepError> {
        advance(lifecycle, ItemState::Acquiring);
        let observer = ItemObserver::new(ctx.events, ctx.session, reference.ordinal, Stage::Acquiring)
            .throttled(self.progress_throttle.clone());
        let path = self
            .acquirer
            .acquire(reference, ctx.quality, ctx.dir, ctx.cancel, &observer)
            .await?;
        if ctx.cancel.is_cancelled() {
            remove_quietly(&path).await;
            return Err(StepError::Cancelled);
        }

        advance(lifecycle, ItemState::Normalizing);
        stage_started(ctx, reference, Stage::Normalizing);
        let normalized = match self
            .normalizer
            .normalize(&path, reference.kind, ctx.quality)
            .await
        {
            Ok(normalized) => normalized,
            Err(err) => {
                remove_quietly(&path).await;
                return Err(StepError::failed(FailureKind::InternalTool, err.to_string()));
            }
        };
        warnings.extend(normalized.warning.clone());

        advance(lifecycle, ItemState::Partitioning);
        stage_started(ctx, reference, Stage::Partitioning);
        let split = match reference.kind {
            MediaKind::Video => self.partitioner.partition_if_needed(&normalized.path).await,
            MediaKind::Document => {
                self.partitioner
                    .partition_bytes_if_needed(&normalized.path)
                    .await
            }
            MediaKind::Image => Ok(vec![normalized.path.clone()]),
        };
        let parts = match split {
            Ok(parts) => parts,
            Err(err) => {
                remove_quietly(&normalized.path).await;
                return Err(StepError::failed(FailureKind::Io, err.to_string()));
            }
        };

        advance(lifecycle, ItemState::Delivering);
        let caption = item_caption(reference, ctx.options.custom_caption.as_deref());
        let observer = ItemObserver::new(ctx.events, ctx.session, reference.ordinal, Stage::Delivering);
        let request = DeliveryRequest {
            kind: reference.kind,
            parts: &parts,
            caption: &caption,
            info: normalized.info,
            watermark: ctx.options.watermark.as_deref(),
        };
        match self.delivery.deliver(request, &observer).await {
            Ok(outcome) => Ok(outcome.total),
            Err(DeliveryError::PartialDelivery { uploaded, total }) => Err(StepError::failed(
                FailureKind::PartialDelivery { uploaded, total },
                format!("only {uploaded} of {total} parts delivered"),
            )),
            Err(err) => Err(StepError::failed(FailureKind::Delivery, err.to_string())),
        }
    }

    async fn notify(&self, notice: &Notice) {
        if let Err(err) = self.transport.send_notice(notice).await {
            relay_error!("Could not send notice: {err}");
        }
    }
}

fn advance(lifecycle: &mut ItemLifecycle, next: ItemState) {
    if let Err(err) = lifecycle.advance(next) {
        relay_error!("{err}");
    }
}

fn stage_started(ctx: &ItemContext<'_>, reference: &Reference, stage: Stage) {
    ctx.events.emit(EngineEvent::Progress(ItemProgress {
        session: ctx.session,
        ordinal: reference.ordinal,
        stage,
        bytes: 0,
        total: None,
        percent: None,
        workers: None,
    }));
}

fn report(
    ctx: &ItemContext<'_>,
    reference: &Reference,
    lifecycle: &ItemLifecycle,
    outcome: ItemOutcome,
    warnings: Vec<String>,
) -> ItemReport {
    ItemReport {
        session: ctx.session,
        ordinal: reference.ordinal,
        title: reference.title.clone(),
        url: reference.url.clone(),
        kind: reference.kind,
        state: lifecycle.state(),
        outcome,
        warnings,
    }
}
