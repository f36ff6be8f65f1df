pub mod db;
pub mod gateway;
pub mod memory;

pub use db::DbAdapter;
pub use gateway::HttpPointGateway;
pub use memory::{MemoryLedger, MemoryThresholds};

use ambassador_core::{PortResult, ThresholdConfig, ThresholdSource};
use async_trait::async_trait;

/// The admin side of the threshold config: sessions only read it, admins replace it.
#[async_trait]
pub trait ThresholdStore: ThresholdSource {
    async fn save_threshold_config(&self, config: &ThresholdConfig) -> PortResult<()>;
}
