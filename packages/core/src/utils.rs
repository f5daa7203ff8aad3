// ABOUTME: Shared utility functions for Polybox
// ABOUTME: Execution ID generation, nonces, and timestamps

use chrono::Utc;
use rand::Rng;

/// Seconds since the Unix epoch
pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Generate a random lowercase hex string of the given length
pub fn random_hex(len: usize) -> String {
    const CHARSET: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Nonce for transient in-container paths, unique per call
///
/// Nanosecond timestamp plus a random suffix, safe to embed in a shell word.
pub fn generate_nonce() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}_{}", nanos, random_hex(8))
}

/// Execution ID for the synchronous path: `exec_<unix>_<8 hex>`
pub fn generate_execution_id() -> String {
    format!("exec_{}_{}", unix_timestamp(), random_hex(8))
}

/// Execution ID for tracked (fire-and-forget) executions: `stream_<unix>_<8 hex>`
pub fn generate_stream_execution_id() -> String {
    format!("stream_{}_{}", unix_timestamp(), random_hex(8))
}
