// ABOUTME: Sandbox engine for building language images and running code in containers
// ABOUTME: Exposes the manager facade plus the engine, registry and tracker building blocks

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod image_spec;
pub mod images;
pub mod manager;
pub mod packages;
pub mod providers;
pub mod registry;
pub mod toolchains;
pub mod tracker;
pub mod types;

pub use config::SandboxConfig;
pub use error::{Result, SandboxError};
pub use executor::ExecutionEngine;
pub use health::{HealthReport, HealthStatus};
pub use image_spec::{BuildDescription, DescriptionSource, ImageSpecBuilder};
pub use images::ImageBuilder;
pub use manager::SandboxManager;
pub use packages::PackageInstaller;
pub use providers::{
    BuildOutput, BuildRequest, ContainerConfig, ContainerEngine, ContainerInfo, DockerEngine,
    ExecResult, ImageInfo,
};
pub use registry::SandboxRegistry;
pub use toolchains::{toolchain_for, Toolchain};
pub use tracker::{ExecutionProgress, ExecutionTracker, ProgressEvent};
pub use types::{
    ActiveContainer, CreateImageResponse, ExecutionRecord, ExecutionRequest, ExecutionStatus,
    FileExecutionOptions, ImageBuildSpec, ImageHandle, InstallPackageResponse,
    PackageInstallRequest, ResourceLimits, ShutdownReport,
};

pub use polybox_core::Language;
