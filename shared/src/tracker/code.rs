//! Tracker code normalisation

use thiserror::Error;

/// Longest accepted raw tracker code
pub const MAX_TRACKER_CODE_LEN: usize = 128;

const RESERVED_CHARS: &[char] = &['/', '\\', '.', '*', '[', ']', '#', '?', '@', ':', '<', '>', '|'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTrackerCode {
    #[error("tracker code is empty")]
    Empty,

    #[error("tracker code exceeds 128 characters")]
    TooLong,
}

/// Canonical storage key for a raw tracker code
///
/// Reserved characters and whitespace become `_`, surrounding `_` are
/// trimmed and the result is upper-cased so lookups are case-insensitive.
pub fn sanitize_tracker_code(raw: &str) -> Result<String, InvalidTrackerCode> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvalidTrackerCode::Empty);
    }
    if trimmed.chars().count() > MAX_TRACKER_CODE_LEN {
        return Err(InvalidTrackerCode::TooLong);
    }

    let replaced: String = trimmed
        .chars()
        .map(|c| {
            if c.is_whitespace() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect();

    let code = replaced.trim_matches('_');
    if code.is_empty() {
        return Err(InvalidTrackerCode::Empty);
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_is_uppercased() {
        assert_eq!(sanitize_tracker_code("trk-001").unwrap(), "TRK-001");
        assert_eq!(sanitize_tracker_code("  AWB123 ").unwrap(), "AWB123");
    }

    #[test]
    fn test_reserved_characters_replaced() {
        assert_eq!(sanitize_tracker_code("a/b.c d").unwrap(), "A_B_C_D");
        assert_eq!(sanitize_tracker_code("#abc?").unwrap(), "ABC");
        assert_eq!(sanitize_tracker_code("x[1]:y").unwrap(), "X_1__Y");
    }

    #[test]
    fn test_rejects_empty_and_too_long() {
        assert_eq!(sanitize_tracker_code(""), Err(InvalidTrackerCode::Empty));
        assert_eq!(sanitize_tracker_code("   "), Err(InvalidTrackerCode::Empty));
        assert_eq!(sanitize_tracker_code("//..//"), Err(InvalidTrackerCode::Empty));

        let long = "A".repeat(MAX_TRACKER_CODE_LEN + 1);
        assert_eq!(sanitize_tracker_code(&long), Err(InvalidTrackerCode::TooLong));
        let max = "A".repeat(MAX_TRACKER_CODE_LEN);
        assert_eq!(sanitize_tracker_code(&max).unwrap(), max);
    }
}
