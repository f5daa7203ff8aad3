// ABOUTME: Turns (language, source) into one self-contained shell command
// ABOUTME: User source crosses the shell boundary base64-encoded, never interpolated

use base64::{engine::general_purpose::STANDARD, Engine as _};
use polybox_core::{generate_nonce, Language};

use crate::error::Result;
use crate::toolchains::toolchain_for;

/// Base64 form of source text, safe inside single quotes
pub fn encode_source(code: &str) -> String {
    STANDARD.encode(code.as_bytes())
}

/// Shell command that writes, runs and cleans up `code`
pub fn synthesize(language: Language, code: &str) -> String {
    synthesize_with_nonce(language, code, &generate_nonce())
}

/// Same as `synthesize` for a language given by name
///
/// Names outside the supported set are rejected here even when upstream
/// validation was skipped.
pub fn synthesize_named(language: &str, code: &str) -> Result<String> {
    let language: Language = language.parse()?;
    Ok(synthesize(language, code))
}

/// Command whose program reads `input` on stdin
pub fn synthesize_with_input(language: Language, code: &str, input: Option<&str>) -> String {
    let nonce = generate_nonce();
    let command = synthesize_with_nonce(language, code, &nonce);

    match input {
        Some(input) => {
            let stdin_path = format!("/tmp/stdin_{}", nonce);
            // Newlines around the command keep trailing comments from eating the paren
            format!(
                "echo '{}' | base64 -d > {path} && {{ (\n{}\n) < {path}; status=$?; rm -f {path}; exit $status; }}",
                encode_source(input),
                command,
                path = stdin_path
            )
        }
        None => command,
    }
}

pub(crate) fn synthesize_with_nonce(language: Language, code: &str, nonce: &str) -> String {
    toolchain_for(language).run_command(code, &encode_source(code), nonce)
}

/// Exec argument vector for a synthesized command
pub fn shell_invocation(command: String) -> Vec<String> {
    vec!["bash".to_string(), "-c".to_string(), command]
}
