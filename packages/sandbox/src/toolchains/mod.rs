// ABOUTME: Per-language toolchain handlers behind a single trait
// ABOUTME: Command synthesis, package installation and image blocks are looked up by Language

use polybox_core::Language;

use crate::error::{Result, SandboxError};

mod bash;
mod csharp;
mod node;
mod python;

pub use bash::BashToolchain;
pub use csharp::CsharpToolchain;
pub use node::NodeToolchain;
pub use python::PythonToolchain;

/// Everything the engine needs to know about running one language
pub trait Toolchain: Send + Sync {
    fn language(&self) -> Language;

    /// Shell command that materializes `encoded_source` (base64), runs it and
    /// removes every transient file; `nonce` keeps temp paths unique
    fn run_command(&self, code: &str, encoded_source: &str, nonce: &str) -> String;

    /// Package specifier with the language's pin syntax
    fn package_spec(&self, name: &str, version: Option<&str>) -> String;

    /// Shell snippet that installs a package with the language's package manager
    fn install_script(&self, name: &str, version: Option<&str>) -> String;

    /// Dockerfile lines that install the toolchain; empty when the base OS has it
    fn image_block(&self) -> &'static [&'static str];

    /// Build step that installs a package into an image
    fn install_step(&self, name: &str, version: Option<&str>) -> String {
        format!("RUN {}", self.install_script(name, version))
    }

    /// Argument vector that installs a package inside a running container
    fn install_command(&self, name: &str, version: Option<&str>) -> Vec<String> {
        vec![
            "bash".to_string(),
            "-c".to_string(),
            self.install_script(name, version),
        ]
    }
}

static PYTHON: PythonToolchain = PythonToolchain;
static NODE: NodeToolchain = NodeToolchain;
static CSHARP: CsharpToolchain = CsharpToolchain;
static BASH: BashToolchain = BashToolchain;

/// Toolchain handler for a language
pub fn toolchain_for(language: Language) -> &'static dyn Toolchain {
    match language {
        Language::Python => &PYTHON,
        Language::Node => &NODE,
        Language::Csharp => &CSHARP,
        Language::Bash => &BASH,
    }
}

/// Wrap a script that must clean up after itself while keeping its exit status
pub(crate) fn with_cleanup(run: &str, cleanup: &str) -> String {
    format!("{}; status=$?; {}; exit $status", run, cleanup)
}

/// Reject names and versions that could escape the install command
pub fn validate_package(name: &str, version: Option<&str>) -> Result<()> {
    let name_ok = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-@/+".contains(c));
    if !name_ok {
        return Err(SandboxError::Validation(format!(
            "invalid package name '{}'",
            name
        )));
    }

    if let Some(version) = version {
        let version_ok = !version.is_empty()
            && !version.starts_with('-')
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "._-+~:*^".contains(c));
        if !version_ok {
            return Err(SandboxError::Validation(format!(
                "invalid package version '{}'",
                version
            )));
        }
    }

    Ok(())
}
