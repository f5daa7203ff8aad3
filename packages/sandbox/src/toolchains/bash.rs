// ABOUTME: Bash toolchain: source runs as the command itself
// ABOUTME: Packages come from the OS package manager

use super::Toolchain;
use polybox_core::Language;

pub struct BashToolchain;

impl Toolchain for BashToolchain {
    fn language(&self) -> Language {
        Language::Bash
    }

    fn run_command(&self, code: &str, _encoded_source: &str, _nonce: &str) -> String {
        code.to_string()
    }

    fn package_spec(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{}={}", name, version),
            None => name.to_string(),
        }
    }

    fn install_script(&self, name: &str, version: Option<&str>) -> String {
        format!(
            "apt-get update && apt-get install -y {}",
            self.package_spec(name, version)
        )
    }

    fn image_block(&self) -> &'static [&'static str] {
        &[]
    }
}
