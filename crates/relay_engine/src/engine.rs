use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use relay_logging::relay_error;

use crate::config::EngineConfig;
use crate::deliver::Transport;
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::observe::ChannelProgressSink;
use crate::orchestrator::{BatchOrchestrator, SessionRegistry};
use crate::toolchain::MediaToolchain;
use crate::{EngineEvent, SessionId};

enum EngineCommand {
    RunBatch { session: SessionId },
    Cancel { session: SessionId },
}

/// Runs batches on a background thread with its own tokio runtime.
///
/// Sessions are opened through [`EngineHandle::registry`]; results arrive as
/// [`EngineEvent`]s polled with [`EngineHandle::try_recv`].
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    registry: Arc<SessionRegistry>,
}

impl EngineHandle {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        toolchain: Arc<dyn MediaToolchain>,
    ) -> io::Result<Self> {
        let fetcher = Arc::new(ReqwestFetcher::new(config.fetch.clone()));
        Self::with_fetcher(config, fetcher, transport, toolchain)
    }

    pub fn with_fetcher(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
        transport: Arc<dyn Transport>,
        toolchain: Arc<dyn MediaToolchain>,
    ) -> io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Runtime::new()?;
        let registry = Arc::new(SessionRegistry::new());
        let orchestrator = Arc::new(BatchOrchestrator::new(
            &config,
            registry.clone(),
            fetcher,
            toolchain,
            transport,
        ));

        thread::Builder::new()
            .name("relay-engine".to_string())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        EngineCommand::RunBatch { session } => {
                            let orchestrator = orchestrator.clone();
                            let event_tx = event_tx.clone();
                            runtime.spawn(async move {
                                run_batch(orchestrator.as_ref(), session, event_tx).await;
                            });
                        }
                        EngineCommand::Cancel { session } => {
                            orchestrator.registry().cancel(session);
                        }
                    }
                }
            })?;

        Ok(Self {
            cmd_tx,
            event_rx,
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn run_batch(&self, session: SessionId) {
        let _ = self.cmd_tx.send(EngineCommand::RunBatch { session });
    }

    pub fn cancel(&self, session: SessionId) {
        let _ = self.cmd_tx.send(EngineCommand::Cancel { session });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

async fn run_batch(
    orchestrator: &BatchOrchestrator,
    session: SessionId,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let sink = ChannelProgressSink::new(event_tx.clone());
    if let Err(err) = orchestrator.run_batch(session, &sink).await {
        relay_error!("Session {session} could not run: {err}");
        let _ = event_tx.send(EngineEvent::BatchRejected {
            session,
            reason: err.to_string(),
        });
    }
}
