// ABOUTME: Package installation into images or running containers
// ABOUTME: Rebuild layers a new image over the source; in-place execs into a live container

use polybox_core::Language;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Result, SandboxError};
use crate::image_spec::ImageSpecBuilder;
use crate::providers::{BuildRequest, ContainerEngine};
use crate::toolchains::{toolchain_for, validate_package};
use crate::types::{InstallPackageResponse, PackageInstallRequest};

pub struct PackageInstaller {
    engine: Arc<dyn ContainerEngine>,
    spec_builder: ImageSpecBuilder,
    exec_user: String,
}

impl PackageInstaller {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        spec_builder: ImageSpecBuilder,
        exec_user: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            spec_builder,
            exec_user: exec_user.into(),
        }
    }

    /// Install a package with the strategy the request selects
    pub async fn install(&self, request: &PackageInstallRequest) -> InstallPackageResponse {
        let result = if request.build_new_image {
            self.rebuild(request).await
        } else {
            self.install_in_place(request).await
        };

        result.unwrap_or_else(|e| {
            error!(
                "Installing {} into {} failed: {}",
                request.package_name, request.image_id, e
            );
            InstallPackageResponse::failure(&e)
        })
    }

    fn version(request: &PackageInstallRequest) -> Option<&str> {
        request
            .package_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    async fn rebuild(&self, request: &PackageInstallRequest) -> Result<InstallPackageResponse> {
        let version = Self::version(request);
        validate_package(&request.package_name, version)?;

        if self.engine.inspect_image(&request.image_id).await?.is_none() {
            return Err(SandboxError::ImageNotFound(request.image_id.clone()));
        }

        let dockerfile = self.spec_builder.package_layer(
            &request.image_id,
            request.language,
            &request.package_name,
            version,
        );
        let tag = self.spec_builder.package_image_name(&request.package_name);
        info!(
            "Rebuilding {} with {} package {} as {}",
            request.image_id, request.language, request.package_name, tag
        );

        let output = self
            .engine
            .build_image(&BuildRequest {
                dockerfile,
                tag,
                no_cache: false,
            })
            .await?;

        Ok(InstallPackageResponse {
            success: true,
            new_image_id: Some(output.image_id.into_inner()),
            build_logs: output.logs,
            error_message: None,
        })
    }

    async fn install_in_place(
        &self,
        request: &PackageInstallRequest,
    ) -> Result<InstallPackageResponse> {
        let version = Self::version(request);
        validate_package(&request.package_name, version)?;

        let containers = self
            .engine
            .list_containers_by_ancestor(&request.image_id)
            .await?;
        let container = containers.first().ok_or_else(|| {
            SandboxError::ContainerNotFound(format!(
                "no running container for image {}",
                request.image_id
            ))
        })?;

        info!(
            "Installing {} package {} in running container {}",
            request.language, request.package_name, container.id
        );
        let (exit_code, output) = self
            .run_install(&container.id, request.language, &request.package_name, version)
            .await?;

        if exit_code == 0 {
            let log = if output.trim().is_empty() {
                "Package installed successfully".to_string()
            } else {
                output
            };
            Ok(InstallPackageResponse {
                success: true,
                new_image_id: None,
                build_logs: vec![log],
                error_message: None,
            })
        } else {
            Ok(InstallPackageResponse {
                success: false,
                new_image_id: None,
                error_message: Some(format!("Package installation failed: {}", output.trim())),
                build_logs: vec![output],
            })
        }
    }

    async fn run_install(
        &self,
        container_id: &str,
        language: Language,
        name: &str,
        version: Option<&str>,
    ) -> Result<(i64, String)> {
        let command = toolchain_for(language).install_command(name, version);
        let result = self
            .engine
            .exec(container_id, command, &self.exec_user)
            .await?;
        Ok((result.exit_code, result.output_lossy()))
    }

    /// Install into a specific running container, reporting only success
    pub async fn install_in_container(
        &self,
        container_id: &str,
        language: Language,
        name: &str,
        version: Option<&str>,
    ) -> bool {
        let version = version.map(str::trim).filter(|v| !v.is_empty());
        if let Err(e) = validate_package(name, version) {
            warn!("Refusing install in {}: {}", container_id, e);
            return false;
        }

        match self.run_install(container_id, language, name, version).await {
            Ok((0, _)) => true,
            Ok((code, output)) => {
                warn!(
                    "Install of {} in {} exited with {}: {}",
                    name, container_id, code, output
                );
                false
            }
            Err(e) => {
                warn!("Install of {} in {} failed: {}", name, container_id, e);
                false
            }
        }
    }
}
