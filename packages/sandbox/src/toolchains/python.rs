// ABOUTME: Python toolchain: python3 interpreter and pip
// ABOUTME: Source is decoded into a unique temp file and removed after the run

use super::{with_cleanup, Toolchain};
use polybox_core::Language;

pub struct PythonToolchain;

impl Toolchain for PythonToolchain {
    fn language(&self) -> Language {
        Language::Python
    }

    fn run_command(&self, _code: &str, encoded_source: &str, nonce: &str) -> String {
        let path = format!("/tmp/exec_{}.py", nonce);
        let run = format!(
            "echo '{}' | base64 -d > {} && python3 {}",
            encoded_source, path, path
        );
        with_cleanup(&run, &format!("rm -f {}", path))
    }

    fn package_spec(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{}=={}", name, version),
            None => name.to_string(),
        }
    }

    fn install_script(&self, name: &str, version: Option<&str>) -> String {
        format!("pip install {}", self.package_spec(name, version))
    }

    fn image_block(&self) -> &'static [&'static str] {
        &[
            "# Install Python",
            "RUN apt-get update && apt-get install -y \\",
            "    python3 \\",
            "    python3-pip \\",
            "    && rm -rf /var/lib/apt/lists/* \\",
            "    && python3 --version",
        ]
    }
}
