// ABOUTME: Core types and utilities shared by every Polybox package
// ABOUTME: Defines the closed language set and execution identifier generation

pub mod types;
pub mod utils;

// Re-export main types
pub use types::{CoreError, Language};

// Re-export utilities
pub use utils::{
    generate_execution_id, generate_nonce, generate_stream_execution_id, random_hex,
    unix_timestamp,
};
