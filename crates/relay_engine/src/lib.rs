//! Relay engine: acquisition, repackaging and delivery of media references.
mod acquire;
mod artifact;
mod config;
mod deliver;
mod engine;
mod fetch;
mod filename;
mod observe;
mod orchestrator;
mod partition;
mod persist;
mod retry;
mod toolchain;
mod types;

pub use acquire::{select_strategy, AcquireSettings, AcquisitionController, AcquisitionError, Strategy};
pub use artifact::{ArtifactNormalizer, NormalizedArtifact};
pub use config::EngineConfig;
pub use deliver::{
    DeliveryError, DeliveryOutcome, DeliveryPipeline, DeliveryRequest, DeliverySettings, Notice,
    SendError, SendMetadata, SendRequest, Transport,
};
pub use engine::EngineHandle;
pub use fetch::{FetchError, FetchSettings, FetchedFile, Fetcher, ReqwestFetcher};
pub use filename::{artifact_extension, artifact_stem};
pub use observe::{ChannelProgressSink, ItemObserver, NoProgress, ProgressSink, TransferObserver};
pub use orchestrator::{BatchError, BatchOrchestrator, SessionOptions, SessionRegistry};
pub use partition::{discover_parts, PartitionSettings, Partitioner};
pub use persist::{ensure_dir, remove_quietly, session_dir, AtomicFileWriter, PersistError};
pub use retry::{retry_with_backoff, RetryPolicy, RetryVerdict};
pub use toolchain::{
    FfmpegToolchain, Flow, MediaInfo, MediaToolchain, SegmentObserver, SegmentedRequest, ToolError,
};
pub use types::{
    EngineEvent, FailureKind, ItemOutcome, ItemProgress, ItemReport, SessionId, Stage,
};
