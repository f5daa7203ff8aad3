// ABOUTME: Node.js toolchain: node runtime and global npm installs
// ABOUTME: Installed from the NodeSource 22.x channel in generated images

use super::{with_cleanup, Toolchain};
use polybox_core::Language;

pub struct NodeToolchain;

impl Toolchain for NodeToolchain {
    fn language(&self) -> Language {
        Language::Node
    }

    fn run_command(&self, _code: &str, encoded_source: &str, nonce: &str) -> String {
        let path = format!("/tmp/exec_{}.js", nonce);
        let run = format!(
            "echo '{}' | base64 -d > {} && node {}",
            encoded_source, path, path
        );
        with_cleanup(&run, &format!("rm -f {}", path))
    }

    fn package_spec(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{}@{}", name, version),
            None => name.to_string(),
        }
    }

    fn install_script(&self, name: &str, version: Option<&str>) -> String {
        format!("npm install -g {}", self.package_spec(name, version))
    }

    fn image_block(&self) -> &'static [&'static str] {
        &[
            "# Install Node.js",
            "RUN curl -fsSL https://deb.nodesource.com/setup_22.x | bash - \\",
            "    && apt-get install -y nodejs \\",
            "    && node --version \\",
            "    && npm --version",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_uses_js_temp_file() {
        let cmd = NodeToolchain.run_command("console.log(1)", "Y29uc29sZS5sb2coMSk=", "7_ff");
        assert!(cmd.contains("> /tmp/exec_7_ff.js && node /tmp/exec_7_ff.js"));
        assert!(cmd.contains("rm -f /tmp/exec_7_ff.js"));
    }

    #[test]
    fn test_pin_syntax() {
        assert_eq!(NodeToolchain.package_spec("lodash", Some("4.17.21")), "lodash@4.17.21");
        assert_eq!(NodeToolchain.install_script("lodash", None), "npm install -g lodash");
    }
}
