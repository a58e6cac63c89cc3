//! # Subject Matching
//!
//! Dot-separated subjects with single-token `*` wildcards.

/// Check whether `subject` matches `pattern`.
///
/// Tokens are separated by `.`; a `*` token in the pattern matches exactly
/// one subject token. Patterns and subjects with different token counts
/// never match.
#[must_use]
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            _ => return false,
        }
    }
}
