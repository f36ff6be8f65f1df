//! services/api/src/adapters/memory.rs
//!
//! In-memory implementations of the ledger and threshold ports, used when no
//! database is configured and in tests.

use ambassador_core::{
    PortResult, ThresholdConfig, ThresholdSource, ViewedDocumentEntry, ViewingLedger,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::adapters::ThresholdStore;

/// Customer id → (document id → last credited time).
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<String, HashMap<String, DateTime<Utc>>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ViewingLedger for MemoryLedger {
    async fn last_viewed(
        &self,
        customer_id: &str,
        document_id: &str,
    ) -> PortResult<Option<DateTime<Utc>>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(customer_id)
            .and_then(|docs| docs.get(document_id))
            .copied())
    }

    async fn set_last_viewed(
        &self,
        customer_id: &str,
        document_id: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.entries
            .write()
            .await
            .entry(customer_id.to_string())
            .or_default()
            .insert(document_id.to_string(), at);
        Ok(())
    }

    async fn entries(&self, customer_id: &str) -> PortResult<Vec<ViewedDocumentEntry>> {
        let entries = self.entries.read().await;
        let mut viewed: Vec<ViewedDocumentEntry> = entries
            .get(customer_id)
            .into_iter()
            .flatten()
            .map(|(document_id, at)| ViewedDocumentEntry {
                customer_id: customer_id.to_string(),
                document_id: document_id.clone(),
                last_viewed_at: *at,
            })
            .collect();
        viewed.sort_by(|a, b| b.last_viewed_at.cmp(&a.last_viewed_at));
        Ok(viewed)
    }

    async fn clear(&self, customer_id: &str) -> PortResult<()> {
        self.entries.write().await.remove(customer_id);
        Ok(())
    }
}

/// Threshold config held in process memory, seeded from the configured defaults.
#[derive(Debug)]
pub struct MemoryThresholds {
    config: RwLock<ThresholdConfig>,
}

impl MemoryThresholds {
    pub fn new(initial: ThresholdConfig) -> Self {
        Self {
            config: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl ThresholdSource for MemoryThresholds {
    async fn threshold_config(&self) -> PortResult<ThresholdConfig> {
        Ok(*self.config.read().await)
    }
}

#[async_trait]
impl ThresholdStore for MemoryThresholds {
    async fn save_threshold_config(&self, config: &ThresholdConfig) -> PortResult<()> {
        *self.config.write().await = *config;
        Ok(())
    }
}
