// ABOUTME: Language enumeration supported by the sandbox engine
// ABOUTME: Closed set of toolchains; parsing anything else is an explicit error

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Programming languages a sandbox image can carry a toolchain for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    Csharp,
    Bash,
}

impl Language {
    /// Every supported language, in image build order
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::Node,
        Language::Csharp,
        Language::Bash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
            Language::Csharp => "csharp",
            Language::Bash => "bash",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "node" => Ok(Language::Node),
            "csharp" => Ok(Language::Csharp),
            "bash" => Ok(Language::Bash),
            _ => Err(CoreError::UnsupportedLanguage(s.to_string())),
        }
    }
}
