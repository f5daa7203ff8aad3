// ABOUTME: C# toolchain on the .NET 8 SDK
// ABOUTME: Runs source through a throwaway console project in a unique temp directory

use super::{with_cleanup, Toolchain};
use polybox_core::Language;

pub struct CsharpToolchain;

impl Toolchain for CsharpToolchain {
    fn language(&self) -> Language {
        Language::Csharp
    }

    fn run_command(&self, _code: &str, encoded_source: &str, nonce: &str) -> String {
        let dir = format!("/tmp/csharp_exec_{}", nonce);
        // Program.cs is written after scaffolding so the template is overwritten
        let run = format!(
            "mkdir -p {dir} && cd {dir} && dotnet new console --force > /dev/null \
             && echo '{source}' | base64 -d > Program.cs && dotnet run",
            dir = dir,
            source = encoded_source
        );
        with_cleanup(&run, &format!("cd / && rm -rf {}", dir))
    }

    fn package_spec(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{} --version {}", name, version),
            None => name.to_string(),
        }
    }

    fn install_script(&self, name: &str, version: Option<&str>) -> String {
        format!(
            "mkdir -p /workspace && cd /workspace && dotnet new console --force && dotnet add package {}",
            self.package_spec(name, version)
        )
    }

    fn image_block(&self) -> &'static [&'static str] {
        &[
            "# Install .NET SDK",
            "RUN wget https://packages.microsoft.com/config/ubuntu/22.04/packages-microsoft-prod.deb \\",
            "    -O packages-microsoft-prod.deb \\",
            "    && dpkg -i packages-microsoft-prod.deb \\",
            "    && rm packages-microsoft-prod.deb \\",
            "    && apt-get update \\",
            "    && apt-get install -y dotnet-sdk-8.0 \\",
            "    && rm -rf /var/lib/apt/lists/* \\",
            "    && dotnet --version",
        ]
    }
}
