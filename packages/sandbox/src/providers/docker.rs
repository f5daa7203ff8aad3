// ABOUTME: Docker engine implementation for execution sandboxes
// ABOUTME: Uses bollard to build images and run short-lived execution containers

use super::{
    BuildOutput, BuildRequest, ContainerConfig, ContainerEngine, ContainerInfo, ExecResult,
    ImageInfo,
};
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::types::ImageHandle;
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    errors::Error as BollardError,
    exec::{CreateExecOptions, StartExecResults},
    image::{BuildImageOptions, ListImagesOptions},
    models::HostConfig,
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3660);
const DEFAULT_STOP_TIMEOUT_SECS: i64 = 10;

pub struct DockerEngine {
    client: Docker,
    label_prefix: String,
    /// Client-side timeout applied to every engine request
    timeout: Duration,
    stop_timeout_secs: i64,
}

impl DockerEngine {
    /// Connect with the default socket and request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Connect with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| SandboxError::EngineUnavailable(e.to_string()))?;

        Ok(Self::with_client_and_timeout(client, timeout))
    }

    /// Connect using timeouts from the sandbox configuration
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let mut engine = Self::with_timeout(config.docker_timeout())?;
        engine.stop_timeout_secs = config.stop_timeout_secs as i64;
        Ok(engine)
    }

    /// Create with a specific Docker connection and default timeout
    pub fn with_client(client: Docker) -> Self {
        Self::with_client_and_timeout(client, DEFAULT_TIMEOUT)
    }

    /// Create with a specific Docker connection and custom timeout
    pub fn with_client_and_timeout(client: Docker, timeout: Duration) -> Self {
        Self {
            client: client.with_timeout(timeout),
            label_prefix: "polybox".to_string(),
            timeout,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }

    /// Convert our config to bollard config
    fn to_bollard_config(&self, config: &ContainerConfig) -> Config<String> {
        let mut labels = config.labels.clone();
        labels.insert(format!("{}.managed", self.label_prefix), "true".to_string());

        let env: Vec<String> = config
            .env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            memory: Some(config.memory_bytes),
            cpu_quota: Some(config.cpu_quota),
            cpu_period: Some(config.cpu_period),
            network_mode: if config.network_enabled {
                None
            } else {
                Some("none".to_string())
            },
            ..Default::default()
        };

        // tty + open stdin keep the default shell alive until the explicit exec
        Config {
            image: Some(config.image.clone()),
            env: Some(env),
            working_dir: Some(config.working_dir.clone()),
            user: Some(config.user.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            network_disabled: Some(!config.network_enabled),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Translate transport-level failures into the sandbox taxonomy
    fn map_error(&self, err: BollardError) -> SandboxError {
        match err {
            BollardError::RequestTimeoutError => SandboxError::Timeout {
                seconds: self.timeout.as_secs(),
            },
            BollardError::SocketNotFoundError(path) => {
                SandboxError::EngineUnavailable(format!("Docker socket not found: {}", path))
            }
            BollardError::IOError { err } => SandboxError::EngineUnavailable(err.to_string()),
            other => SandboxError::Docker(other),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> bool {
        match self.client.ping().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Docker not available: {}", e);
                false
            }
        }
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput> {
        info!("Building image: {}", request.tag);

        let context = dockerfile_context(&request.dockerfile)?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: request.tag.clone(),
            rm: true,
            forcerm: true,
            nocache: request.no_cache,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(context.into()));
        let mut logs = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(line) = info.stream {
                        let line = line.trim_end();
                        if !line.is_empty() {
                            logs.push(line.to_string());
                        }
                    }
                    if let Some(message) = info.error {
                        error!("Build of {} failed: {}", request.tag, message);
                        return Err(SandboxError::BuildFailed { message, logs });
                    }
                }
                Err(e) => {
                    error!("Build of {} aborted: {}", request.tag, e);
                    return Err(SandboxError::BuildFailed {
                        message: self.map_error(e).to_string(),
                        logs,
                    });
                }
            }
        }

        let image = self
            .inspect_image(&request.tag)
            .await?
            .ok_or_else(|| SandboxError::BuildFailed {
                message: format!("image {} missing after build", request.tag),
                logs: logs.clone(),
            })?;

        debug!("Built image {} ({} log lines)", image.id, logs.len());
        Ok(BuildOutput {
            image_id: ImageHandle::new(image.id),
            logs,
        })
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>> {
        match self.client.inspect_image(image).await {
            Ok(inspect) => Ok(Some(ImageInfo {
                id: inspect.id.unwrap_or_else(|| image.to_string()),
                tags: inspect.repo_tags.unwrap_or_default(),
            })),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(self.map_error(e)),
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let images = self
            .client
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                tags: image.repo_tags,
            })
            .collect())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        info!("Creating container from image: {}", config.image);

        let bollard_config = self.to_bollard_config(config);
        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let container = self
            .client
            .create_container(options, bollard_config)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => SandboxError::ImageNotFound(config.image.clone()),
                other => self.map_error(other),
            })?;

        for warning in &container.warnings {
            warn!("Container {} created with warning: {}", container.id, warning);
        }

        debug!("Created container: {}", container.id);
        Ok(container.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        info!("Starting container: {}", container_id);

        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(())
    }

    async fn exec(&self, container_id: &str, command: Vec<String>, user: &str) -> Result<ExecResult> {
        debug!("Executing command in container {} as {}", container_id, user);

        let exec_config = CreateExecOptions {
            cmd: Some(command),
            user: Some(user.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(container_id, exec_config)
            .await
            .map_err(|e| self.map_error(e))?;

        let start_result = self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| self.map_error(e))?;

        let mut output = Vec::new();

        match start_result {
            StartExecResults::Attached {
                output: mut stream, ..
            } => {
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message })
                        | Ok(LogOutput::StdErr { message })
                        | Ok(LogOutput::Console { message }) => output.extend_from_slice(&message),
                        Ok(_) => {}
                        Err(e) => return Err(self.map_error(e)),
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::ExecutionFailed(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let exec_inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| self.map_error(e))?;

        // A missing exit code means the process state is unknown
        let exit_code = exec_inspect.exit_code.unwrap_or(-1);

        Ok(ExecResult { exit_code, output })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        info!(
            "Stopping container: {} (timeout: {}s)",
            container_id, self.stop_timeout_secs
        );

        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };

        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!("Container {} already stopped", container_id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(SandboxError::ContainerNotFound(container_id.to_string())),
            Err(e) => Err(self.map_error(e)),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        info!("Removing container: {}", container_id);

        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.client.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Container {} already removed", container_id);
                Ok(())
            }
            Err(e) => Err(self.map_error(e)),
        }
    }

    async fn list_containers_by_ancestor(&self, image: &str) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert("ancestor".to_string(), vec![image.to_string()]);

        let options = ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(containers
            .into_iter()
            .filter_map(|container| {
                Some(ContainerInfo {
                    id: container.id?,
                    image: container.image.unwrap_or_default(),
                    state: container.state.unwrap_or_default(),
                })
            })
            .collect())
    }
}

/// Build context holding a single Dockerfile
fn dockerfile_context(dockerfile: &str) -> std::io::Result<Vec<u8>> {
    use tar::{Builder, Header};

    let mut header = Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);

    let mut archive = Builder::new(Vec::new());
    archive.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;
    archive.into_inner()
}
