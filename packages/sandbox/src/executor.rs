// ABOUTME: Execution engine running one code request in its own container
// ABOUTME: Always tears the container down and always returns a terminal record

use chrono::Utc;
use futures::FutureExt;
use polybox_core::generate_execution_id;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::command::{shell_invocation, synthesize_with_input};
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::providers::{ContainerConfig, ContainerEngine, ExecResult};
use crate::registry::SandboxRegistry;
use crate::types::{
    ActiveContainer, ExecutionRecord, ExecutionRequest, ShutdownReport, CPU_PERIOD_MICROS,
};

pub struct ExecutionEngine {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<SandboxRegistry>,
    config: Arc<SandboxConfig>,
}

impl ExecutionEngine {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<SandboxRegistry>,
        config: Arc<SandboxConfig>,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> Arc<SandboxRegistry> {
        self.registry.clone()
    }

    /// Run a request to completion under a fresh execution id
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionRecord {
        self.execute_with_id(generate_execution_id(), request).await
    }

    /// Run a request to completion; never returns a non-terminal record
    pub async fn execute_with_id(
        &self,
        execution_id: String,
        request: ExecutionRequest,
    ) -> ExecutionRecord {
        let started = Instant::now();
        let record = ExecutionRecord::started(&execution_id);

        if let Err(e) = self.registry.begin_execution(record.clone()).await {
            error!("Could not register execution {}: {}", execution_id, e);
            return record.failed(e.to_string(), 0.0);
        }

        info!(
            "Executing {} code as {} ({} bytes)",
            request.language,
            execution_id,
            request.code.len()
        );

        let outcome = AssertUnwindSafe(self.run(&execution_id, &request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(panic)));

        let elapsed = started.elapsed().as_secs_f64();
        let finished = match outcome {
            Ok(result) => {
                debug!("{} exited with {}", execution_id, result.exit_code);
                let stdout = result.output_lossy();
                record.finished(result.exit_code, stdout, elapsed)
            }
            Err(SandboxError::Timeout { seconds }) => {
                warn!("{} timed out after {}s", execution_id, seconds);
                record.timed_out(
                    format!("Execution timed out after {} seconds", seconds),
                    elapsed,
                )
            }
            Err(e) => {
                warn!("{} failed: {}", execution_id, e);
                record.failed(e.to_string(), elapsed)
            }
        };

        if let Err(e) = self.registry.finish_execution(finished.clone()).await {
            error!("Could not finish execution {}: {}", execution_id, e);
        }

        info!(
            "Execution {} finished: {} in {:.2}s",
            execution_id, finished.status, finished.execution_time
        );
        finished
    }

    /// Terminal failed record for a request that never reached the engine
    pub async fn reject(&self, error: &SandboxError) -> ExecutionRecord {
        let record = ExecutionRecord::started(generate_execution_id());
        let failed = record.clone().failed(error.to_string(), 0.0);

        if let Err(e) = self.registry.begin_execution(record).await {
            error!("Could not register rejected execution: {}", e);
            return failed;
        }
        if let Err(e) = self.registry.finish_execution(failed.clone()).await {
            error!("Could not finish rejected execution: {}", e);
        }
        failed
    }

    async fn run(&self, execution_id: &str, request: &ExecutionRequest) -> Result<ExecResult> {
        let command = synthesize_with_input(
            request.language,
            &request.code,
            request.input_data.as_deref(),
        );
        let config = self.container_config(execution_id, request);

        let container_id = self.engine.create_container(&config).await?;
        self.registry
            .register_container(ActiveContainer {
                container_id: container_id.clone(),
                execution_id: execution_id.to_string(),
                image: config.image.clone(),
                started_at: Utc::now(),
            })
            .await;

        let guard = TeardownGuard::new(
            self.engine.clone(),
            self.registry.clone(),
            execution_id.to_string(),
            container_id.clone(),
        );

        let outcome = AssertUnwindSafe(async {
            self.engine.start_container(&container_id).await?;
            self.engine
                .exec(&container_id, shell_invocation(command), &self.config.exec_user)
                .await
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_error(panic)));

        guard.teardown().await;
        outcome
    }

    fn container_config(&self, execution_id: &str, request: &ExecutionRequest) -> ContainerConfig {
        let limits = request.resource_limits;
        let image = request
            .image_id
            .clone()
            .filter(|image| !image.trim().is_empty())
            .unwrap_or_else(|| self.config.default_image.clone());

        ContainerConfig {
            image,
            name: Some(format!("polybox-{}", execution_id)),
            env_vars: merge_env(&self.config.baseline_env, &request.environment_variables),
            working_dir: request.working_directory.clone(),
            memory_bytes: limits.memory_bytes(),
            cpu_quota: limits.cpu_quota(),
            cpu_period: CPU_PERIOD_MICROS,
            network_enabled: limits.network_enabled(),
            user: self.config.exec_user.clone(),
            labels: HashMap::from([
                ("polybox.execution_id".to_string(), execution_id.to_string()),
                (
                    "polybox.language".to_string(),
                    request.language.as_str().to_string(),
                ),
                (
                    "polybox.timeout_seconds".to_string(),
                    limits.timeout_seconds().to_string(),
                ),
            ]),
        }
    }

    /// Stop and remove every tracked container, collecting failures
    pub async fn shutdown(&self) -> ShutdownReport {
        let containers = self.registry.drain_containers().await;
        info!("Shutting down, cleaning {} containers", containers.len());

        let mut report = ShutdownReport::default();
        for container in containers {
            match cleanup_container(self.engine.as_ref(), &container.container_id).await {
                Ok(()) => report.cleaned.push(container.container_id),
                Err(e) => {
                    warn!("Failed to clean up {}: {}", container.container_id, e);
                    report.failures.push((container.container_id, e.to_string()));
                }
            }
        }

        report
    }
}

/// Request values override baseline entries; an empty override keeps the baseline value
fn merge_env(
    baseline: &BTreeMap<String, String>,
    request: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = baseline.clone();
    for (key, value) in request {
        if value.is_empty() && baseline.contains_key(key) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Stop then remove; removal is attempted even when stop fails
async fn cleanup_container(engine: &dyn ContainerEngine, container_id: &str) -> Result<()> {
    let stopped = engine.stop_container(container_id).await;
    if let Err(e) = &stopped {
        debug!("Stop of {} failed, forcing removal: {}", container_id, e);
    }
    engine.remove_container(container_id).await
}

fn panic_error(panic: Box<dyn Any + Send>) -> SandboxError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    SandboxError::ExecutionFailed(format!("internal fault: {}", message))
}

/// Removes the container and its registry entry even if the execution future is dropped
struct TeardownGuard {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<SandboxRegistry>,
    execution_id: String,
    container_id: String,
    armed: bool,
}

impl TeardownGuard {
    fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<SandboxRegistry>,
        execution_id: String,
        container_id: String,
    ) -> Self {
        Self {
            engine,
            registry,
            execution_id,
            container_id,
            armed: true,
        }
    }

    async fn teardown(mut self) {
        self.armed = false;
        teardown(
            self.engine.as_ref(),
            &self.registry,
            &self.execution_id,
            &self.container_id,
        )
        .await;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(
                "Container {} leaked: no runtime available for teardown",
                self.container_id
            );
            return;
        };

        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let execution_id = std::mem::take(&mut self.execution_id);
        let container_id = std::mem::take(&mut self.container_id);
        handle.spawn(async move {
            teardown(engine.as_ref(), &registry, &execution_id, &container_id).await;
        });
    }
}

async fn teardown(
    engine: &dyn ContainerEngine,
    registry: &SandboxRegistry,
    execution_id: &str,
    container_id: &str,
) {
    if let Err(e) = cleanup_container(engine, container_id).await {
        warn!("Cleanup of container {} failed: {}", container_id, e);
    }
    registry.release_container(execution_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BuildOutput, BuildRequest, ContainerInfo, ImageInfo};
    use crate::types::{ExecutionStatus, ResourceLimits};
    use async_trait::async_trait;
    use mockall::mock;
    use polybox_core::Language;

    mock! {
        pub Engine {}

        #[async_trait]
        impl ContainerEngine for Engine {
            async fn ping(&self) -> bool;
            async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput>;
            async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>>;
            async fn list_images(&self) -> Result<Vec<ImageInfo>>;
            async fn create_container(&self, config: &ContainerConfig) -> Result<String>;
            async fn start_container(&self, container_id: &str) -> Result<()>;
            async fn exec(&self, container_id: &str, command: Vec<String>, user: &str) -> Result<ExecResult>;
            async fn stop_container(&self, container_id: &str) -> Result<()>;
            async fn remove_container(&self, container_id: &str) -> Result<()>;
            async fn list_containers_by_ancestor(&self, image: &str) -> Result<Vec<ContainerInfo>>;
        }
    }

    fn executor(mock: MockEngine) -> ExecutionEngine {
        ExecutionEngine::new(
            Arc::new(mock),
            Arc::new(SandboxRegistry::new()),
            Arc::new(SandboxConfig::default()),
        )
    }

    fn expect_lifecycle(mock: &mut MockEngine) {
        mock.expect_create_container()
            .times(1)
            .returning(|_| Ok("ctr-1".to_string()));
        mock.expect_start_container().times(1).returning(|_| Ok(()));
        mock.expect_stop_container().times(1).returning(|_| Ok(()));
        mock.expect_remove_container().times(1).returning(|_| Ok(()));
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let mut mock = MockEngine::new();
        expect_lifecycle(&mut mock);
        mock.expect_exec().times(1).returning(|_, command, user| {
            assert_eq!(command[0], "bash");
            assert_eq!(user, "root");
            Ok(ExecResult {
                exit_code: 0,
                output: b"hello\n".to_vec(),
            })
        });

        let executor = executor(mock);
        let record = executor
            .execute(ExecutionRequest::new(Language::Python, "print('hello')"))
            .await;

        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.stdout, "hello\n");
        assert_eq!(record.stderr, "");
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(executor.registry().active_count().await, 0);
        assert_eq!(
            executor.registry().record(&record.execution_id).await,
            Some(record)
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let mut mock = MockEngine::new();
        expect_lifecycle(&mut mock);
        mock.expect_exec().returning(|_, _, _| {
            Ok(ExecResult {
                exit_code: 1,
                output: b"Traceback".to_vec(),
            })
        });

        let record = executor(mock)
            .execute(ExecutionRequest::new(Language::Python, "raise SystemExit(1)"))
            .await;
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.exit_code, Some(1));
        assert_eq!(record.stdout, "Traceback");
    }

    #[tokio::test]
    async fn test_create_failure_becomes_failed_record() {
        let mut mock = MockEngine::new();
        mock.expect_create_container()
            .returning(|config| Err(SandboxError::ImageNotFound(config.image.clone())));
        mock.expect_start_container().never();
        mock.expect_remove_container().never();

        let executor = executor(mock);
        let record = executor
            .execute(ExecutionRequest::new(Language::Bash, "echo hi").with_image("missing:1"))
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("missing:1"));
        assert_eq!(executor.registry().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_exec_error_still_tears_down() {
        let mut mock = MockEngine::new();
        expect_lifecycle(&mut mock);
        mock.expect_exec()
            .returning(|_, _, _| Err(SandboxError::EngineUnavailable("socket closed".into())));

        let executor = executor(mock);
        let record = executor
            .execute(ExecutionRequest::new(Language::Node, "console.log(1)"))
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("socket closed"));
        assert_eq!(executor.registry().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_panic_in_engine_still_tears_down() {
        let mut mock = MockEngine::new();
        expect_lifecycle(&mut mock);
        mock.expect_exec()
            .returning(|_, _, _| panic!("engine exploded"));

        let executor = executor(mock);
        let record = executor
            .execute(ExecutionRequest::new(Language::Bash, "echo hi"))
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("engine exploded"));
        assert_eq!(executor.registry().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_engine_timeout_maps_to_timeout_status() {
        let mut mock = MockEngine::new();
        expect_lifecycle(&mut mock);
        mock.expect_exec()
            .returning(|_, _, _| Err(SandboxError::Timeout { seconds: 30 }));

        let record = executor(mock)
            .execute(ExecutionRequest::new(Language::Bash, "sleep 100"))
            .await;
        assert_eq!(record.status, ExecutionStatus::Timeout);
        assert!(record.error_message.unwrap().contains("30 seconds"));
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_result() {
        let mut mock = MockEngine::new();
        mock.expect_create_container()
            .returning(|_| Ok("ctr-1".to_string()));
        mock.expect_start_container().returning(|_| Ok(()));
        mock.expect_exec().returning(|_, _, _| {
            Ok(ExecResult {
                exit_code: 0,
                output: b"ok".to_vec(),
            })
        });
        mock.expect_stop_container()
            .returning(|id| Err(SandboxError::ContainerNotFound(id.to_string())));
        mock.expect_remove_container()
            .times(1)
            .returning(|_| Err(SandboxError::EngineUnavailable("gone".into())));

        let executor = executor(mock);
        let record = executor
            .execute(ExecutionRequest::new(Language::Bash, "echo ok"))
            .await;
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(executor.registry().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_container_config_translation() {
        let mut mock = MockEngine::new();
        mock.expect_create_container().returning(|config| {
            assert_eq!(config.image, "custom:1");
            assert_eq!(config.memory_bytes, 256 * 1024 * 1024);
            assert_eq!(config.cpu_quota, 50_000);
            assert_eq!(config.cpu_period, 100_000);
            assert!(config.network_enabled);
            assert_eq!(config.user, "root");
            assert_eq!(config.working_dir, "/tmp/work");
            assert_eq!(config.env_vars.get("PYTHONUNBUFFERED").unwrap(), "1");
            assert_eq!(config.env_vars.get("NODE_ENV").unwrap(), "production");
            assert_eq!(config.env_vars.get("EXTRA").unwrap(), "yes");
            Ok("ctr-1".to_string())
        });
        mock.expect_start_container().returning(|_| Ok(()));
        mock.expect_exec().returning(|_, _, _| {
            Ok(ExecResult {
                exit_code: 0,
                output: Vec::new(),
            })
        });
        mock.expect_stop_container().returning(|_| Ok(()));
        mock.expect_remove_container().returning(|_| Ok(()));

        let mut request = ExecutionRequest::new(Language::Python, "pass")
            .with_image("custom:1")
            .with_env("NODE_ENV", "production")
            .with_env("PYTHONUNBUFFERED", "")
            .with_env("EXTRA", "yes")
            .with_limits(ResourceLimits::new(256, 0.5, 60, true).unwrap());
        request.working_directory = "/tmp/work".to_string();

        let record = executor(mock).execute(request).await;
        assert_eq!(record.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_reject_records_failure() {
        let executor = executor(MockEngine::new());
        let record = executor
            .reject(&SandboxError::FileNotFound("abc".into()))
            .await;
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("File not found: abc")
        );
        assert!(executor.registry().record(&record.execution_id).await.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_collects_failures() {
        let mut mock = MockEngine::new();
        mock.expect_stop_container().returning(|_| Ok(()));
        mock.expect_remove_container().returning(|id| {
            if id == "ctr-bad" {
                Err(SandboxError::EngineUnavailable("down".into()))
            } else {
                Ok(())
            }
        });

        let executor = executor(mock);
        for (exec, ctr) in [("exec_a", "ctr-good"), ("exec_b", "ctr-bad")] {
            executor
                .registry()
                .register_container(ActiveContainer {
                    container_id: ctr.to_string(),
                    execution_id: exec.to_string(),
                    image: "img".to_string(),
                    started_at: Utc::now(),
                })
                .await;
        }

        let report = executor.shutdown().await;
        assert_eq!(report.cleaned, vec!["ctr-good".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "ctr-bad");
        assert_eq!(executor.registry().active_count().await, 0);
    }

    #[test]
    fn test_merge_env_never_drops_baseline() {
        let baseline = BTreeMap::from([("A".to_string(), "1".to_string())]);
        let request = HashMap::from([
            ("A".to_string(), String::new()),
            ("B".to_string(), "2".to_string()),
        ]);
        let merged = merge_env(&baseline, &request);
        assert_eq!(merged.get("A").unwrap(), "1");
        assert_eq!(merged.get("B").unwrap(), "2");
    }
}
