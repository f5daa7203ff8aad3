// ABOUTME: In-memory container engine used by integration tests
// ABOUTME: Simulates builds, container lifecycle and program output without Docker

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use polybox_sandbox::{
    BuildOutput, BuildRequest, ContainerConfig, ContainerEngine, ContainerInfo, ExecResult,
    ImageHandle, ImageInfo, Result, SandboxConfig, SandboxError, SandboxManager,
};
use polybox_storage::MemoryFileStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub config: ContainerConfig,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct ExecCall {
    pub container_id: String,
    pub command: Vec<String>,
    pub user: String,
}

#[derive(Default)]
struct FakeState {
    images: HashMap<String, ImageInfo>,
    containers: HashMap<String, FakeContainer>,
    builds: Vec<BuildRequest>,
    execs: Vec<ExecCall>,
    removed: Vec<String>,
}

pub struct FakeEngine {
    state: Mutex<FakeState>,
    next_id: AtomicU64,
    available: AtomicBool,
    exec_delay: Duration,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_exec_delay(Duration::from_millis(5))
    }

    pub fn with_exec_delay(exec_delay: Duration) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            exec_delay,
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Seed an image and return its id
    pub fn add_image(&self, tag: &str) -> String {
        let id = format!("sha256:{:016x}", self.next());
        self.state.lock().unwrap().images.insert(
            id.clone(),
            ImageInfo {
                id: id.clone(),
                tags: vec![tag.to_string()],
            },
        );
        id
    }

    /// Start a long-lived container outside any execution
    pub fn spawn_running_container(&self, image: &str) -> String {
        let id = format!("ctr-{}", self.next());
        let config = ContainerConfig {
            image: image.to_string(),
            name: None,
            env_vars: Default::default(),
            working_dir: "/workspace".to_string(),
            memory_bytes: 0,
            cpu_quota: 0,
            cpu_period: 0,
            network_enabled: false,
            user: "root".to_string(),
            labels: HashMap::new(),
        };
        self.state.lock().unwrap().containers.insert(
            id.clone(),
            FakeContainer {
                config,
                state: "running".to_string(),
            },
        );
        id
    }

    pub fn image(&self, image: &str) -> Option<ImageInfo> {
        let state = self.state.lock().unwrap();
        find_image(&state.images, image).cloned()
    }

    pub fn image_count(&self) -> usize {
        self.state.lock().unwrap().images.len()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.state.lock().unwrap().builds.clone()
    }

    pub fn execs(&self) -> Vec<ExecCall> {
        self.state.lock().unwrap().execs.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }
}

fn find_image<'a>(images: &'a HashMap<String, ImageInfo>, image: &str) -> Option<&'a ImageInfo> {
    images.values().find(|info| {
        info.id == image
            || info
                .tags
                .iter()
                .any(|tag| tag == image || tag.strip_suffix(":latest") == Some(image))
    })
}

/// Decoded `echo '<b64>' | base64 -d` payloads, in order
fn decoded_payloads(script: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut rest = script;
    while let Some(start) = rest.find("echo '") {
        let after = &rest[start + "echo '".len()..];
        let Some(end) = after.find('\'') else {
            break;
        };
        let tail = &after[end + 1..];
        if tail.starts_with(" | base64 -d") {
            if let Ok(bytes) = STANDARD.decode(&after[..end]) {
                payloads.push(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        rest = tail;
    }
    payloads
}

fn first_literal(line: &str) -> Option<&str> {
    let start = line.find(['\'', '"'])?;
    let quote = line[start..].chars().next()?;
    let body = &line[start + 1..];
    let end = body.find(quote)?;
    Some(&body[..end])
}

fn exit_code_in(line: &str) -> Option<i64> {
    let idx = line.find("exit")?;
    let digits: String = line[idx + 4..]
        .chars()
        .skip_while(|c| *c == '(' || *c == ' ')
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Pretend to run a synthesized command: quoted literals are printed, `input()` echoes stdin
fn simulate(script: &str) -> (i64, String) {
    if script.contains("nonexistent-package") {
        return (1, "E: Unable to locate package nonexistent-package\n".to_string());
    }
    for installer in ["pip install ", "npm install -g ", "dotnet add package ", "apt-get install -y "] {
        if let Some(idx) = script.find(installer) {
            let package = script[idx + installer.len()..].split_whitespace().next().unwrap_or("");
            return (0, format!("Successfully installed {}\n", package));
        }
    }

    let payloads = decoded_payloads(script);
    let has_stdin = script.contains("/tmp/stdin_");
    let stdin = if has_stdin { payloads.first().cloned() } else { None };
    let source = if payloads.len() > usize::from(has_stdin) {
        payloads.last().cloned().unwrap_or_default()
    } else {
        script.to_string()
    };

    let mut output = String::new();
    for line in source.lines() {
        if line.contains("input()") || line.contains("ReadLine()") {
            if let Some(stdin) = &stdin {
                output.push_str(stdin.lines().next().unwrap_or(""));
                output.push('\n');
            }
            continue;
        }
        if let Some(code) = exit_code_in(line) {
            return (code, output);
        }
        if let Some(literal) = first_literal(line) {
            output.push_str(literal);
            output.push('\n');
        }
    }
    (0, output)
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput> {
        let logs: Vec<String> = request
            .dockerfile
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(i, line)| format!("Step {} : {}", i + 1, line))
            .collect();

        let mut state = self.state.lock().unwrap();
        state.builds.push(request.clone());

        if request.dockerfile.contains("FAIL_BUILD") {
            return Err(SandboxError::BuildFailed {
                message: "The command '/bin/sh -c FAIL_BUILD' returned a non-zero code: 127"
                    .to_string(),
                logs,
            });
        }

        let id = format!("sha256:{:016x}", self.next());
        state.images.insert(
            id.clone(),
            ImageInfo {
                id: id.clone(),
                tags: vec![request.tag.clone()],
            },
        );

        Ok(BuildOutput {
            image_id: ImageHandle::new(id),
            logs,
        })
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>> {
        Ok(self.image(image))
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        Ok(self.state.lock().unwrap().images.values().cloned().collect())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if find_image(&state.images, &config.image).is_none() {
            return Err(SandboxError::ImageNotFound(config.image.clone()));
        }

        let id = format!("ctr-{}", self.next());
        state.containers.insert(
            id.clone(),
            FakeContainer {
                config: config.clone(),
                state: "created".to_string(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| SandboxError::ContainerNotFound(container_id.to_string()))?;
        container.state = "running".to_string();
        Ok(())
    }

    async fn exec(&self, container_id: &str, command: Vec<String>, user: &str) -> Result<ExecResult> {
        {
            let mut state = self.state.lock().unwrap();
            let running = state
                .containers
                .get(container_id)
                .map(|c| c.state == "running")
                .unwrap_or(false);
            if !running {
                return Err(SandboxError::ContainerNotFound(container_id.to_string()));
            }
            state.execs.push(ExecCall {
                container_id: container_id.to_string(),
                command: command.clone(),
                user: user.to_string(),
            });
        }

        tokio::time::sleep(self.exec_delay).await;

        let script = command.last().cloned().unwrap_or_default();
        let (exit_code, output) = simulate(&script);
        Ok(ExecResult {
            exit_code,
            output: output.into_bytes(),
        })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(container_id) {
            Some(container) => {
                container.state = "exited".to_string();
                Ok(())
            }
            None => Err(SandboxError::ContainerNotFound(container_id.to_string())),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.containers.remove(container_id);
        state.removed.push(container_id.to_string());
        Ok(())
    }

    async fn list_containers_by_ancestor(&self, image: &str) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock().unwrap();
        let Some(target) = find_image(&state.images, image) else {
            return Ok(Vec::new());
        };

        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| c.state == "running")
            .filter(|(_, c)| {
                find_image(&state.images, &c.config.image).map(|i| &i.id) == Some(&target.id)
            })
            .map(|(id, c)| ContainerInfo {
                id: id.clone(),
                image: c.config.image.clone(),
                state: c.state.clone(),
            })
            .collect())
    }
}

pub fn test_config() -> SandboxConfig {
    SandboxConfig {
        progress_poll_interval_ms: 50,
        ..SandboxConfig::default()
    }
    .without_project_dockerfile()
}

/// Manager over a fresh fake engine and in-memory file store
pub fn manager() -> (Arc<FakeEngine>, SandboxManager) {
    manager_with(FakeEngine::new())
}

pub fn manager_with(engine: FakeEngine) -> (Arc<FakeEngine>, SandboxManager) {
    let engine = Arc::new(engine);
    let manager = SandboxManager::new(
        engine.clone(),
        Arc::new(MemoryFileStore::new()),
        test_config(),
    );
    (engine, manager)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
