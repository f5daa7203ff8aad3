// ABOUTME: Container engine trait consumed by the sandbox engine
// ABOUTME: Defines the image and container operations an engine backend must provide

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::types::ImageHandle;

pub mod docker;

pub use docker::DockerEngine;

/// Container configuration for one execution sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    pub image: String,
    pub name: Option<String>,
    pub env_vars: BTreeMap<String, String>,
    pub working_dir: String,
    pub memory_bytes: i64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub network_enabled: bool,
    pub user: String,
    pub labels: HashMap<String, String>,
}

/// Image build input: a build description and the tag to give the result
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub dockerfile: String,
    pub tag: String,
    pub no_cache: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub image_id: ImageHandle,
    pub logs: Vec<String>,
}

/// Execution result from running a command in a container
///
/// stdout and stderr arrive interleaved in `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    pub exit_code: i64,
    pub output: Vec<u8>,
}

impl ExecResult {
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub image: String,
    pub state: String,
}

/// Backend that builds images and runs containers
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether the engine answers at all
    async fn ping(&self) -> bool;

    /// Build an image; a failed step yields `SandboxError::BuildFailed` with the logs so far
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput>;

    /// Look up an image by id or tag, `None` if it does not exist
    async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>>;

    async fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// Create (but do not start) a container, returning its id
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Run a command inside a running container as `user`
    async fn exec(&self, container_id: &str, command: Vec<String>, user: &str) -> Result<ExecResult>;

    /// Stop a container; already-stopped containers are not an error
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Force-remove a container and its volumes; missing containers are not an error
    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Running containers created from `image`
    async fn list_containers_by_ancestor(&self, image: &str) -> Result<Vec<ContainerInfo>>;
}
