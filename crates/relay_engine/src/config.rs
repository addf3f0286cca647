use std::path::PathBuf;

use relay_core::{KindTable, PlatformPolicy, QualityTable, WorkerBudgetSettings};

use crate::acquire::AcquireSettings;
use crate::deliver::DeliverySettings;
use crate::fetch::FetchSettings;
use crate::partition::PartitionSettings;

/// Everything the engine needs to run batches.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent of the per-session working directories.
    pub work_dir: PathBuf,
    pub fetch: FetchSettings,
    pub budget: WorkerBudgetSettings,
    pub acquire: AcquireSettings,
    pub partition: PartitionSettings,
    pub delivery: DeliverySettings,
    pub qualities: QualityTable,
    pub kinds: KindTable,
    pub platforms: PlatformPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./downloads"),
            fetch: FetchSettings::default(),
            budget: WorkerBudgetSettings::default(),
            acquire: AcquireSettings::default(),
            partition: PartitionSettings::default(),
            delivery: DeliverySettings::default(),
            qualities: QualityTable::default(),
            kinds: KindTable::default(),
            platforms: PlatformPolicy::default(),
        }
    }
}
