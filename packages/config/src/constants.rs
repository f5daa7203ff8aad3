// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Polybox

// Images
pub const POLYBOX_DEFAULT_IMAGE: &str = "POLYBOX_DEFAULT_IMAGE";
pub const POLYBOX_DEFAULT_BASE_OS: &str = "POLYBOX_DEFAULT_BASE_OS";
pub const POLYBOX_IMAGE_PREFIX: &str = "POLYBOX_IMAGE_PREFIX";
pub const POLYBOX_PROJECT_DOCKERFILE: &str = "POLYBOX_PROJECT_DOCKERFILE";

// Container Execution
pub const POLYBOX_EXEC_USER: &str = "POLYBOX_EXEC_USER";
pub const POLYBOX_SANDBOX_USER: &str = "POLYBOX_SANDBOX_USER";
pub const POLYBOX_STOP_TIMEOUT_SECS: &str = "POLYBOX_STOP_TIMEOUT_SECS";

// Docker Connection
pub const POLYBOX_DOCKER_TIMEOUT_SECS: &str = "POLYBOX_DOCKER_TIMEOUT_SECS";

// Execution Tracking
pub const POLYBOX_PROGRESS_POLL_INTERVAL_MS: &str = "POLYBOX_PROGRESS_POLL_INTERVAL_MS";

// File Uploads
pub const POLYBOX_UPLOAD_DIR: &str = "POLYBOX_UPLOAD_DIR";

