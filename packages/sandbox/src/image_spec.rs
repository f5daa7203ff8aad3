// ABOUTME: Builds image build descriptions from requested language sets
// ABOUTME: Applies project-default > custom > generated precedence and picks unique tags

use polybox_core::{unix_timestamp, Language};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::toolchains::toolchain_for;
use crate::types::{ImageBuildSpec, DEFAULT_WORKING_DIRECTORY};

static TAG_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `<unix-seconds>-<counter>`, unique within the process
fn unique_suffix() -> String {
    let counter = TAG_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", unix_timestamp(), counter)
}

/// Normalize text into a tag component: `[a-z0-9-]`, no leading, trailing or repeated `-`
pub fn sanitize_tag_component(raw: &str) -> String {
    let mut sanitized = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            sanitized.push(c.to_ascii_lowercase());
        } else {
            sanitized.push('-');
        }
    }

    sanitized
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Where a build description came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionSource {
    ProjectDefault,
    Custom,
    Generated,
}

/// Build description plus the tag the resulting image receives
#[derive(Debug, Clone, PartialEq)]
pub struct BuildDescription {
    pub dockerfile: String,
    pub image_name: String,
    pub tag: String,
    pub source: DescriptionSource,
}

#[derive(Debug, Clone)]
pub struct ImageSpecBuilder {
    project_dockerfile: Option<PathBuf>,
    image_prefix: String,
    sandbox_user: String,
    default_base_os: String,
}

impl ImageSpecBuilder {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            project_dockerfile: config.project_dockerfile.clone(),
            image_prefix: config.image_prefix.clone(),
            sandbox_user: config.sandbox_user.clone(),
            default_base_os: config.default_base_os.clone(),
        }
    }

    /// Resolve the description for a build request
    pub async fn describe(&self, spec: &ImageBuildSpec) -> Result<BuildDescription> {
        spec.validate()?;

        let image_name = match &spec.image_name {
            Some(name) => name.clone(),
            None => format!("{}-{}", self.image_prefix, unique_suffix()),
        };
        let tag = if image_name.contains(':') {
            image_name.clone()
        } else {
            format!("{}:latest", image_name)
        };

        let (dockerfile, source) = if let Some(project) = self.project_default().await? {
            (project, DescriptionSource::ProjectDefault)
        } else if let Some(custom) = &spec.custom_dockerfile {
            (custom.clone(), DescriptionSource::Custom)
        } else {
            (self.generate(spec), DescriptionSource::Generated)
        };

        debug!("Using {:?} build description for {}", source, tag);
        Ok(BuildDescription {
            dockerfile,
            image_name,
            tag,
            source,
        })
    }

    async fn project_default(&self) -> Result<Option<String>> {
        let Some(path) = &self.project_dockerfile else {
            return Ok(None);
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Generated description covering every requested language
    pub fn generate(&self, spec: &ImageBuildSpec) -> String {
        let build_stamp = unix_timestamp();
        let mut lines: Vec<String> = vec![
            format!(
                "FROM {}",
                spec.base_os.as_deref().unwrap_or(&self.default_base_os)
            ),
            String::new(),
            "# Cache busting".to_string(),
            format!("RUN echo 'Cache bust: {}' > /tmp/cache_bust.txt", build_stamp),
            String::new(),
            "# Install system dependencies".to_string(),
            "RUN apt-get update && apt-get install -y \\".to_string(),
            "    curl \\".to_string(),
            "    git \\".to_string(),
            "    build-essential \\".to_string(),
            "    wget \\".to_string(),
            "    gnupg \\".to_string(),
            "    libicu-dev \\".to_string(),
            "    libssl-dev \\".to_string(),
            "    ca-certificates \\".to_string(),
            "    && rm -rf /var/lib/apt/lists/*".to_string(),
            String::new(),
        ];

        for language in &spec.languages {
            let block = toolchain_for(*language).image_block();
            if block.is_empty() {
                continue;
            }
            lines.extend(block.iter().map(|line| line.to_string()));
            lines.push(String::new());
        }

        let requirements = self.requirement_steps(spec);
        if !requirements.is_empty() {
            lines.push("# Install requirements".to_string());
            lines.extend(requirements);
            lines.push(String::new());
        }

        let user = &self.sandbox_user;
        lines.extend([
            "# Create workspace and user".to_string(),
            format!("RUN useradd -ms /bin/bash {}", user),
            format!(
                "RUN mkdir -p {dir} && chown {user}:{user} {dir}",
                dir = DEFAULT_WORKING_DIRECTORY,
                user = user
            ),
            format!("USER {}", user),
            format!("WORKDIR {}", DEFAULT_WORKING_DIRECTORY),
            String::new(),
            "# Default command".to_string(),
            "CMD [\"/bin/bash\"]".to_string(),
        ]);

        lines.join("\n")
    }

    fn requirement_steps(&self, spec: &ImageBuildSpec) -> Vec<String> {
        if spec.requirements.is_empty() {
            return Vec::new();
        }

        let installer = [Language::Python, Language::Node]
            .into_iter()
            .find(|language| spec.languages.contains(language));

        let Some(language) = installer else {
            warn!(
                "Ignoring {} requirements: no python or node toolchain requested",
                spec.requirements.len()
            );
            return Vec::new();
        };

        let toolchain = toolchain_for(language);
        spec.requirements
            .iter()
            .map(|(name, version)| {
                let version = Some(version.trim()).filter(|v| !v.is_empty());
                toolchain.install_step(name, version)
            })
            .collect()
    }

    /// Description that layers one package install on top of `source_image`
    pub fn package_layer(
        &self,
        source_image: &str,
        language: Language,
        package_name: &str,
        version: Option<&str>,
    ) -> String {
        [
            format!("FROM {}", source_image),
            "USER root".to_string(),
            toolchain_for(language).install_step(package_name, version),
            format!("USER {}", self.sandbox_user),
        ]
        .join("\n")
    }

    /// Collision-resistant name for an image that adds `package_name`
    pub fn package_image_name(&self, package_name: &str) -> String {
        format!(
            "{}-with-{}-{}",
            self.image_prefix,
            sanitize_tag_component(package_name),
            unique_suffix()
        )
    }
}
