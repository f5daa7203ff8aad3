// ABOUTME: Health reporting for the sandbox engine
// ABOUTME: Combines engine reachability with registry, tracker and image counts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::providers::ContainerEngine;
use crate::registry::SandboxRegistry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub docker_available: bool,
    pub active_containers: usize,
    /// Streaming executions known to the tracker, running or finished
    pub tracked_executions: usize,
    pub available_images: usize,
    pub timestamp: DateTime<Utc>,
}

/// Probe the engine and summarize the registry
pub async fn check_health(
    engine: &dyn ContainerEngine,
    registry: &SandboxRegistry,
    tracked_executions: usize,
) -> HealthReport {
    let docker_available = engine.ping().await;

    let available_images = if docker_available {
        match engine.list_images().await {
            Ok(images) => images.len(),
            Err(e) => {
                warn!("Could not list images for health check: {}", e);
                0
            }
        }
    } else {
        0
    };

    HealthReport {
        status: if docker_available {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        docker_available,
        active_containers: registry.active_count().await,
        tracked_executions,
        available_images,
        timestamp: Utc::now(),
    }
}
