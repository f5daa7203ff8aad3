// ABOUTME: Tracks fire-and-forget executions for progress queries and log streams
// ABOUTME: A spawned job owns each execution and swaps in its terminal snapshot atomically

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use polybox_core::generate_stream_execution_id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::executor::ExecutionEngine;
use crate::types::{ExecutionRecord, ExecutionRequest, ExecutionStatus};

/// Snapshot of one tracked execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ExecutionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionProgress {
    fn running(execution_id: &str) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            logs: vec!["Execution started".to_string()],
            response: None,
            error: None,
        }
    }

    /// Terminal snapshot; anything other than completed reports as failed
    fn finish(&self, record: ExecutionRecord) -> Self {
        let status = if record.status == ExecutionStatus::Completed {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };

        let mut logs = self.logs.clone();
        logs.push(format!("Execution {}", record.status));

        Self {
            execution_id: self.execution_id.clone(),
            status,
            start_time: self.start_time,
            end_time: Some(Utc::now()),
            logs,
            error: record.error_message.clone(),
            response: Some(record),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Event emitted by a log stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress(ExecutionProgress),
    NotFound { execution_id: String },
}

type ProgressMap = Arc<RwLock<HashMap<String, Arc<ExecutionProgress>>>>;

pub struct ExecutionTracker {
    executor: Arc<ExecutionEngine>,
    /// Snapshots stay queryable for the life of the process
    executions: ProgressMap,
    poll_interval: Duration,
}

impl ExecutionTracker {
    pub fn new(executor: Arc<ExecutionEngine>, poll_interval: Duration) -> Self {
        Self {
            executor,
            executions: Arc::new(RwLock::new(HashMap::new())),
            poll_interval,
        }
    }

    /// Start an execution in the background and return its tracking id
    pub async fn start(&self, request: ExecutionRequest) -> String {
        let execution_id = generate_stream_execution_id();
        let initial = Arc::new(ExecutionProgress::running(&execution_id));
        self.executions
            .write()
            .await
            .insert(execution_id.clone(), initial.clone());

        info!("Started tracked execution {}", execution_id);

        let executor = self.executor.clone();
        let executions = self.executions.clone();
        let id = execution_id.clone();
        tokio::spawn(async move {
            let record = executor.execute(request).await;
            let finished = Arc::new(initial.finish(record));
            debug!("Tracked execution {} is {}", id, finished.status);
            executions.write().await.insert(id, finished);
        });

        execution_id
    }

    /// Current snapshot of a tracked execution
    pub async fn progress(&self, execution_id: &str) -> Result<ExecutionProgress> {
        self.executions
            .read()
            .await
            .get(execution_id)
            .map(|progress| progress.as_ref().clone())
            .ok_or_else(|| SandboxError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Poll a tracked execution until it is terminal; the stream always ends
    pub fn stream_logs(&self, execution_id: String) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let executions = self.executions.clone();
        let poll_interval = self.poll_interval;

        stream! {
            loop {
                let snapshot = executions.read().await.get(&execution_id).cloned();
                let progress = match snapshot {
                    Some(progress) => progress,
                    None => {
                        yield ProgressEvent::NotFound { execution_id: execution_id.clone() };
                        break;
                    }
                };

                let terminal = progress.is_terminal();
                yield ProgressEvent::Progress(progress.as_ref().clone());
                if terminal {
                    break;
                }

                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    pub async fn tracked_count(&self) -> usize {
        self.executions.read().await.len()
    }
}
