// ABOUTME: Request, record and response types for sandbox operations
// ABOUTME: Resource limits and image specs validate at construction and deserialization

use crate::error::{Result, SandboxError};
use crate::toolchains::validate_package;
use chrono::{DateTime, Utc};
use polybox_core::Language;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub const MIN_MEMORY_MB: u32 = 64;
pub const MAX_MEMORY_MB: u32 = 8192;
pub const MIN_CPU_CORES: f64 = 0.1;
pub const MAX_CPU_CORES: f64 = 8.0;
pub const MIN_TIMEOUT_SECONDS: u64 = 10;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

pub const DEFAULT_WORKING_DIRECTORY: &str = "/workspace";
pub const DEFAULT_BASE_OS: &str = "ubuntu:22.04";

/// Resource ceilings for a single execution container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResourceLimits")]
pub struct ResourceLimits {
    memory_mb: u32,
    cpu_cores: f64,
    timeout_seconds: u64,
    network_enabled: bool,
}

#[derive(Deserialize)]
struct RawResourceLimits {
    #[serde(default = "default_memory_mb")]
    memory_mb: u32,
    #[serde(default = "default_cpu_cores")]
    cpu_cores: f64,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    network_enabled: bool,
}

fn default_memory_mb() -> u32 {
    512
}

fn default_cpu_cores() -> f64 {
    1.0
}

fn default_timeout_seconds() -> u64 {
    300
}

impl TryFrom<RawResourceLimits> for ResourceLimits {
    type Error = SandboxError;

    fn try_from(raw: RawResourceLimits) -> Result<Self> {
        ResourceLimits::new(
            raw.memory_mb,
            raw.cpu_cores,
            raw.timeout_seconds,
            raw.network_enabled,
        )
    }
}

impl ResourceLimits {
    pub fn new(
        memory_mb: u32,
        cpu_cores: f64,
        timeout_seconds: u64,
        network_enabled: bool,
    ) -> Result<Self> {
        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&memory_mb) {
            return Err(SandboxError::Validation(format!(
                "memory_mb must be between {} and {}, got {}",
                MIN_MEMORY_MB, MAX_MEMORY_MB, memory_mb
            )));
        }

        // NaN fails the range check as well
        if !(MIN_CPU_CORES..=MAX_CPU_CORES).contains(&cpu_cores) {
            return Err(SandboxError::Validation(format!(
                "cpu_cores must be between {} and {}, got {}",
                MIN_CPU_CORES, MAX_CPU_CORES, cpu_cores
            )));
        }

        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&timeout_seconds) {
            return Err(SandboxError::Validation(format!(
                "timeout_seconds must be between {} and {}, got {}",
                MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS, timeout_seconds
            )));
        }

        Ok(Self {
            memory_mb,
            cpu_cores,
            timeout_seconds,
            network_enabled,
        })
    }

    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    pub fn cpu_cores(&self) -> f64 {
        self.cpu_cores
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled
    }

    /// Memory ceiling in bytes, as the engine expects it
    pub fn memory_bytes(&self) -> i64 {
        i64::from(self.memory_mb) * 1024 * 1024
    }

    /// CPU quota in microseconds per `CPU_PERIOD_MICROS`
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_cores * CPU_PERIOD_MICROS as f64).round() as i64
    }
}

pub const CPU_PERIOD_MICROS: i64 = 100_000;

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: default_memory_mb(),
            cpu_cores: default_cpu_cores(),
            timeout_seconds: default_timeout_seconds(),
            network_enabled: false,
        }
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of a built image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHandle(String);

impl ImageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ImageHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Request to build an execution image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBuildSpec {
    pub languages: BTreeSet<Language>,
    /// Unset means the configured default base OS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_dockerfile: Option<String>,
    /// Package name to version; an empty version installs unpinned
    #[serde(default)]
    pub requirements: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

impl ImageBuildSpec {
    pub fn new(languages: impl IntoIterator<Item = Language>) -> Result<Self> {
        let spec = Self {
            languages: languages.into_iter().collect(),
            base_os: None,
            custom_dockerfile: None,
            requirements: BTreeMap::new(),
            image_name: None,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_image_name(mut self, name: impl Into<String>) -> Self {
        self.image_name = Some(name.into());
        self
    }

    pub fn with_base_os(mut self, base_os: impl Into<String>) -> Self {
        self.base_os = Some(base_os.into());
        self
    }

    pub fn with_custom_dockerfile(mut self, dockerfile: impl Into<String>) -> Self {
        self.custom_dockerfile = Some(dockerfile.into());
        self
    }

    pub fn with_requirement(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.requirements.insert(name.into(), version.into());
        self
    }

    /// Check invariants; deserialized specs must pass this before use
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(SandboxError::Validation(
                "at least one language is required".to_string(),
            ));
        }

        if self.base_os.as_deref().is_some_and(|os| os.trim().is_empty()) {
            return Err(SandboxError::Validation(
                "base_os cannot be empty".to_string(),
            ));
        }

        for (name, version) in &self.requirements {
            validate_package(name, Some(version.trim()).filter(|v| !v.is_empty()))?;
        }

        if let Some(name) = &self.image_name {
            if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                return Err(SandboxError::Validation(format!(
                    "invalid image name '{}'",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// One code execution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default = "default_working_directory")]
    pub working_directory: String,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// Fed to the program on stdin when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<String>,
}

pub(crate) fn default_working_directory() -> String {
    DEFAULT_WORKING_DIRECTORY.to_string()
}

impl ExecutionRequest {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            image_id: None,
            working_directory: default_working_directory(),
            environment_variables: HashMap::new(),
            resource_limits: ResourceLimits::default(),
            input_data: None,
        }
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input_data = Some(input.into());
        self
    }
}

/// Options for executing a previously uploaded file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileExecutionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<String>,
}

/// Tracked outcome of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub error_message: Option<String>,
    pub execution_time: f64,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Record for an execution that has just begun
    pub fn started(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Running,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            error_message: None,
            execution_time: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Terminal record from a finished process; status follows the exit code
    pub fn finished(self, exit_code: i64, stdout: String, execution_time: f64) -> Self {
        let status = if exit_code == 0 {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };

        Self {
            status,
            stdout,
            stderr: String::new(),
            exit_code: Some(exit_code),
            execution_time,
            ..self
        }
    }

    pub fn failed(self, error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error_message: Some(error.into()),
            execution_time,
            ..self
        }
    }

    pub fn timed_out(self, error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            error_message: Some(error.into()),
            execution_time,
            ..self
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Request to add a package to an image or a running container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInstallRequest {
    pub image_id: String,
    pub language: Language,
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    #[serde(default = "default_build_new_image")]
    pub build_new_image: bool,
}

fn default_build_new_image() -> bool {
    true
}

impl PackageInstallRequest {
    pub fn new(image_id: impl Into<String>, language: Language, package_name: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            language,
            package_name: package_name.into(),
            package_version: None,
            build_new_image: true,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.package_version = Some(version.into());
        self
    }

    pub fn in_place(mut self) -> Self {
        self.build_new_image = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateImageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default)]
    pub build_logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CreateImageResponse {
    pub fn failure(error: &SandboxError) -> Self {
        Self {
            success: false,
            build_logs: error.build_logs(),
            error_message: Some(error.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallPackageResponse {
    pub success: bool,
    /// New image for the rebuild strategy, `None` for in-place installs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_image_id: Option<String>,
    #[serde(default)]
    pub build_logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InstallPackageResponse {
    pub fn failure(error: &SandboxError) -> Self {
        Self {
            success: false,
            build_logs: error.build_logs(),
            error_message: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Container owned by an in-flight execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveContainer {
    pub container_id: String,
    pub execution_id: String,
    pub image: String,
    pub started_at: DateTime<Utc>,
}

/// Outcome of draining the registry at shutdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub cleaned: Vec<String>,
    /// (container id, error message)
    pub failures: Vec<(String, String)>,
}
