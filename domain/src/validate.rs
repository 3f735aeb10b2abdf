//! Input validation. Every rule is checked so callers can report the full
//! list of violations in one pass, not just the first.

use std::fmt::{Display, Formatter};

/// Minimum length for a short code.
pub const CODE_MIN_LEN: usize = 6;
/// Maximum length for a short code.
pub const CODE_MAX_LEN: usize = 20;
/// Codes that collide with application routes; rejected case-insensitively.
pub const RESERVED_CODES: &[&str] = &["api", "admin", "www", "app"];

const URL_MAX_LEN: usize = 2048;

/// A single violated short-code rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeIssue {
    Empty,
    /// Only ASCII alphanumerics, '-' and '_' are allowed.
    DisallowedCharacters,
    TooShort { min: usize },
    TooLong { max: usize },
    /// The code equals a reserved word.
    Reserved,
}

impl Display for CodeIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeIssue::Empty => write!(f, "code must not be empty"),
            CodeIssue::DisallowedCharacters => {
                write!(f, "only letters, digits, '-' and '_' are allowed")
            }
            CodeIssue::TooShort { min } => write!(f, "code must be at least {} characters", min),
            CodeIssue::TooLong { max } => write!(f, "code must be at most {} characters", max),
            CodeIssue::Reserved => write!(f, "code is a reserved word"),
        }
    }
}

/// A single violated URL rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UrlIssue {
    Empty,
    /// Must start with http:// or https://.
    UnsupportedScheme,
    TooLong { max: usize },
}

impl Display for UrlIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlIssue::Empty => write!(f, "url must not be empty"),
            UrlIssue::UnsupportedScheme => write!(f, "url must start with http:// or https://"),
            UrlIssue::TooLong { max } => write!(f, "url must be at most {} characters", max),
        }
    }
}

/// Validate a candidate short code against the full rule set.
/// Returns every violated rule; an empty list means the code is valid.
pub fn validate_code(s: &str) -> Vec<CodeIssue> {
    if s.is_empty() {
        return vec![CodeIssue::Empty];
    }
    let mut issues = Vec::new();
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        issues.push(CodeIssue::DisallowedCharacters);
    }
    if s.len() < CODE_MIN_LEN {
        issues.push(CodeIssue::TooShort { min: CODE_MIN_LEN });
    }
    if s.len() > CODE_MAX_LEN {
        issues.push(CodeIssue::TooLong { max: CODE_MAX_LEN });
    }
    if RESERVED_CODES.iter().any(|r| r.eq_ignore_ascii_case(s)) {
        issues.push(CodeIssue::Reserved);
    }
    issues
}

/// Validate an original URL. Kept intentionally light to avoid heavy parsing
/// crates: scheme check and a length bound.
pub fn validate_original_url(s: &str) -> Vec<UrlIssue> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return vec![UrlIssue::Empty];
    }
    let mut issues = Vec::new();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        issues.push(UrlIssue::UnsupportedScheme);
    }
    if trimmed.len() > URL_MAX_LEN {
        issues.push(UrlIssue::TooLong { max: URL_MAX_LEN });
    }
    issues
}
