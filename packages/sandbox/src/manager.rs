// ABOUTME: Sandbox manager exposing every engine operation behind one handle
// ABOUTME: Wires the container engine, file store, registry and tracker together

use futures::Stream;
use polybox_core::Language;
use polybox_storage::{FileMetadata, FileStats, FileStore, FileUpload, LocalFileStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::executor::ExecutionEngine;
use crate::health::{check_health, HealthReport};
use crate::image_spec::ImageSpecBuilder;
use crate::images::ImageBuilder;
use crate::packages::PackageInstaller;
use crate::providers::{ContainerEngine, DockerEngine};
use crate::registry::SandboxRegistry;
use crate::tracker::{ExecutionProgress, ExecutionTracker, ProgressEvent};
use crate::types::{
    default_working_directory, CreateImageResponse, ExecutionRecord, ExecutionRequest,
    FileExecutionOptions, ImageBuildSpec, InstallPackageResponse, PackageInstallRequest,
    ShutdownReport,
};

/// Sandbox engine entry point
pub struct SandboxManager {
    config: Arc<SandboxConfig>,
    engine: Arc<dyn ContainerEngine>,
    files: Arc<dyn FileStore>,
    registry: Arc<SandboxRegistry>,
    executor: Arc<ExecutionEngine>,
    images: ImageBuilder,
    packages: PackageInstaller,
    tracker: ExecutionTracker,
}

impl SandboxManager {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        files: Arc<dyn FileStore>,
        config: SandboxConfig,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SandboxRegistry::new());
        let executor = Arc::new(ExecutionEngine::new(
            engine.clone(),
            registry.clone(),
            config.clone(),
        ));
        let spec_builder = ImageSpecBuilder::new(&config);

        Self {
            images: ImageBuilder::new(engine.clone(), spec_builder.clone()),
            packages: PackageInstaller::new(engine.clone(), spec_builder, config.exec_user.clone()),
            tracker: ExecutionTracker::new(executor.clone(), config.progress_poll_interval()),
            config,
            engine,
            files,
            registry,
            executor,
        }
    }

    /// Connect to the local Docker daemon and open the upload directory
    ///
    /// Fails when the daemon does not answer a ping.
    pub async fn connect(config: SandboxConfig) -> Result<Self> {
        let engine = DockerEngine::from_config(&config)?;
        if !engine.ping().await {
            return Err(SandboxError::EngineUnavailable(
                "Docker daemon did not respond to ping".to_string(),
            ));
        }

        let files = LocalFileStore::open(&config.upload_dir).await?;
        info!("Sandbox manager connected to Docker");
        Ok(Self::new(Arc::new(engine), Arc::new(files), config))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<SandboxRegistry> {
        self.registry.clone()
    }

    pub async fn health(&self) -> HealthReport {
        let tracked = self.tracker.tracked_count().await;
        check_health(self.engine.as_ref(), &self.registry, tracked).await
    }

    pub async fn create_image(&self, spec: &ImageBuildSpec) -> CreateImageResponse {
        self.images.create_image(spec).await
    }

    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionRecord {
        self.executor.execute(request).await
    }

    pub async fn get_execution_result(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.registry
            .record(execution_id)
            .await
            .ok_or_else(|| SandboxError::ExecutionNotFound(execution_id.to_string()))
    }

    pub async fn install_package(&self, request: &PackageInstallRequest) -> InstallPackageResponse {
        self.packages.install(request).await
    }

    pub async fn install_package_in_container(
        &self,
        container_id: &str,
        language: Language,
        package_name: &str,
        version: Option<&str>,
    ) -> bool {
        self.packages
            .install_in_container(container_id, language, package_name, version)
            .await
    }

    pub async fn upload_file(&self, upload: FileUpload) -> Result<FileMetadata> {
        Ok(self.files.upload(upload).await?)
    }

    pub async fn list_files(&self) -> Result<Vec<FileMetadata>> {
        Ok(self.files.list().await?)
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<bool> {
        Ok(self.files.delete(file_id).await?)
    }

    pub async fn file_stats(&self) -> Result<FileStats> {
        Ok(self.files.stats().await?)
    }

    /// Execute a stored file as if its content had been submitted directly
    pub async fn execute_uploaded_file(
        &self,
        file_id: &str,
        options: FileExecutionOptions,
    ) -> ExecutionRecord {
        let file = match self.files.get(file_id).await {
            Ok(Some(file)) => file,
            Ok(None) => {
                return self
                    .executor
                    .reject(&SandboxError::FileNotFound(file_id.to_string()))
                    .await
            }
            Err(e) => {
                warn!("File store lookup for {} failed: {}", file_id, e);
                return self.executor.reject(&SandboxError::Storage(e)).await;
            }
        };

        let request = ExecutionRequest {
            language: file.metadata.language,
            code: file.content,
            image_id: options.image_id,
            working_directory: options
                .working_directory
                .unwrap_or_else(default_working_directory),
            environment_variables: options.environment_variables,
            resource_limits: options.resource_limits,
            input_data: options.input_data,
        };

        self.executor.execute(request).await
    }

    pub async fn start_streaming_execution(&self, request: ExecutionRequest) -> String {
        self.tracker.start(request).await
    }

    pub async fn get_execution_progress(&self, execution_id: &str) -> Result<ExecutionProgress> {
        self.tracker.progress(execution_id).await
    }

    pub fn stream_execution_logs(
        &self,
        execution_id: impl Into<String>,
    ) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        self.tracker.stream_logs(execution_id.into())
    }

    /// Tear down every container still owned by an execution
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.executor.shutdown().await;
        info!(
            "Shutdown cleaned {} containers, {} failures",
            report.cleaned.len(),
            report.failures.len()
        );
        report
    }
}
