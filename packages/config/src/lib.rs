// ABOUTME: Shared configuration helpers for Polybox crates
// ABOUTME: Environment variable names and bounded value parsing

pub mod constants;
pub mod env;

pub use env::parse_bounded;
