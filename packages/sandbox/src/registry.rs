// ABOUTME: Shared registry of active containers and execution records
// ABOUTME: Records move to a terminal state exactly once; containers are tracked until teardown

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, SandboxError};
use crate::types::{ActiveContainer, ExecutionRecord};

/// Concurrency-safe store owned by one engine instance
///
/// Locks are only held for map operations, never across an engine call.
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    /// Keyed by execution id
    active: RwLock<HashMap<String, ActiveContainer>>,
    /// Retained for the life of the process; nothing evicts finished records
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_container(&self, container: ActiveContainer) {
        debug!(
            "Tracking container {} for {}",
            container.container_id, container.execution_id
        );
        self.active
            .write()
            .await
            .insert(container.execution_id.clone(), container);
    }

    pub async fn release_container(&self, execution_id: &str) -> Option<ActiveContainer> {
        self.active.write().await.remove(execution_id)
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Take every active container out of the registry
    pub async fn drain_containers(&self) -> Vec<ActiveContainer> {
        self.active.write().await.drain().map(|(_, c)| c).collect()
    }

    /// Insert the record for an execution that has just begun
    pub async fn begin_execution(&self, record: ExecutionRecord) -> Result<()> {
        if record.is_terminal() {
            return Err(SandboxError::InvalidStateTransition(format!(
                "execution {} cannot begin in terminal state {}",
                record.execution_id, record.status
            )));
        }

        let mut records = self.records.write().await;
        if records.contains_key(&record.execution_id) {
            return Err(SandboxError::InvalidStateTransition(format!(
                "execution {} already exists",
                record.execution_id
            )));
        }
        records.insert(record.execution_id.clone(), record);
        Ok(())
    }

    /// Swap in the terminal record; each execution finishes exactly once
    pub async fn finish_execution(&self, record: ExecutionRecord) -> Result<()> {
        if !record.is_terminal() {
            return Err(SandboxError::InvalidStateTransition(format!(
                "execution {} cannot finish in state {}",
                record.execution_id, record.status
            )));
        }

        let mut records = self.records.write().await;
        match records.get(&record.execution_id) {
            None => Err(SandboxError::ExecutionNotFound(record.execution_id)),
            Some(existing) if existing.is_terminal() => {
                Err(SandboxError::InvalidStateTransition(format!(
                    "execution {} already finished as {}",
                    record.execution_id, existing.status
                )))
            }
            Some(_) => {
                records.insert(record.execution_id.clone(), record);
                Ok(())
            }
        }
    }

    /// Snapshot of an execution record
    pub async fn record(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.records.read().await.get(execution_id).cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}
