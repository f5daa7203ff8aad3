// ABOUTME: Runtime configuration for the sandbox engine
// ABOUTME: Defaults overridable through POLYBOX_* environment variables

use polybox_config::constants as env;
use polybox_config::parse_bounded;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::DEFAULT_BASE_OS;

const DEFAULT_IMAGE: &str = "polybox-executor:latest";
const DEFAULT_IMAGE_PREFIX: &str = "polybox";
const DEFAULT_EXEC_USER: &str = "root";
const DEFAULT_SANDBOX_USER: &str = "sandboxuser";
const DEFAULT_PROJECT_DOCKERFILE: &str = "Dockerfile";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
// Must exceed the longest allowed execution timeout
const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 3660;
const DEFAULT_PROGRESS_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Image used when a request names none
    pub default_image: String,
    pub default_base_os: String,
    /// Prefix for generated image tags
    pub image_prefix: String,
    /// User that runs synthesized commands inside the container
    pub exec_user: String,
    /// Non-root user created by generated images
    pub sandbox_user: String,
    /// Project default build description; `None` disables the lookup
    pub project_dockerfile: Option<PathBuf>,
    pub stop_timeout_secs: u64,
    pub docker_timeout_secs: u64,
    pub progress_poll_interval_ms: u64,
    pub upload_dir: PathBuf,
    /// Variables every execution container receives
    pub baseline_env: BTreeMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_image: DEFAULT_IMAGE.to_string(),
            default_base_os: DEFAULT_BASE_OS.to_string(),
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            exec_user: DEFAULT_EXEC_USER.to_string(),
            sandbox_user: DEFAULT_SANDBOX_USER.to_string(),
            project_dockerfile: Some(PathBuf::from(DEFAULT_PROJECT_DOCKERFILE)),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            docker_timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
            progress_poll_interval_ms: DEFAULT_PROGRESS_POLL_INTERVAL_MS,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            baseline_env: default_baseline_env(),
        }
    }
}

fn default_baseline_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ("NODE_ENV".to_string(), "development".to_string()),
    ])
}

impl SandboxConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let stop_timeout_secs = parse_bounded(
            env::POLYBOX_STOP_TIMEOUT_SECS,
            lookup(env::POLYBOX_STOP_TIMEOUT_SECS),
            0..=60,
            DEFAULT_STOP_TIMEOUT_SECS,
        );
        let docker_timeout_secs = parse_bounded(
            env::POLYBOX_DOCKER_TIMEOUT_SECS,
            lookup(env::POLYBOX_DOCKER_TIMEOUT_SECS),
            30..=7200,
            DEFAULT_DOCKER_TIMEOUT_SECS,
        );
        let progress_poll_interval_ms = parse_bounded(
            env::POLYBOX_PROGRESS_POLL_INTERVAL_MS,
            lookup(env::POLYBOX_PROGRESS_POLL_INTERVAL_MS),
            50..=60_000,
            DEFAULT_PROGRESS_POLL_INTERVAL_MS,
        );

        // An explicitly empty value turns the project Dockerfile lookup off
        let project_dockerfile = match lookup(env::POLYBOX_PROJECT_DOCKERFILE) {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => defaults.project_dockerfile.clone(),
        };

        Self {
            default_image: text(env::POLYBOX_DEFAULT_IMAGE, defaults.default_image),
            default_base_os: text(env::POLYBOX_DEFAULT_BASE_OS, defaults.default_base_os),
            image_prefix: text(env::POLYBOX_IMAGE_PREFIX, defaults.image_prefix),
            exec_user: text(env::POLYBOX_EXEC_USER, defaults.exec_user),
            sandbox_user: text(env::POLYBOX_SANDBOX_USER, defaults.sandbox_user),
            project_dockerfile,
            stop_timeout_secs,
            docker_timeout_secs,
            progress_poll_interval_ms,
            upload_dir: lookup(env::POLYBOX_UPLOAD_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(|v| PathBuf::from(v.trim()))
                .unwrap_or(defaults.upload_dir),
            baseline_env: defaults.baseline_env,
        }
    }

    pub fn docker_timeout(&self) -> Duration {
        Duration::from_secs(self.docker_timeout_secs)
    }

    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_interval_ms)
    }

    /// Config with the project Dockerfile lookup disabled
    pub fn without_project_dockerfile(mut self) -> Self {
        self.project_dockerfile = None;
        self
    }
}
