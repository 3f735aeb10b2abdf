//! Domain library for the link shortener.
//!
//! This crate holds the domain types, ports (traits), and error definitions.
//! It stays dependency-light (serde for the persisted shapes, rand/uuid for
//! code and id generation). Keep storage adapters and IO concerns out of
//! this crate.

use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::validate::{CodeIssue, UrlIssue};

/// Default validity window for a new short URL, in minutes.
pub const DEFAULT_VALIDITY_MINUTES: u64 = 30;

/// The compact identifier appended to the short-URL base to address a
/// specific mapping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    /// Construct a code from user input, running the full rule set.
    /// All violated rules are reported, not just the first.
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        let issues = validate::validate_code(&val);
        if !issues.is_empty() {
            return Err(CoreError::InvalidCode(issues));
        }
        Ok(Self(val))
    }

    /// Construct without re-running the rule set. Generator output is
    /// alphanumeric at a fixed length and cannot violate the rules.
    pub(crate) fn from_generated(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Input data for creating a new short URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewShortUrl {
    pub original_url: String,
    /// User-supplied code; bypasses generation but not validation.
    pub custom_code: Option<String>,
    /// Validity window in minutes; defaults to [`DEFAULT_VALIDITY_MINUTES`].
    pub validity_minutes: Option<u64>,
}

/// One recorded visit to a short URL. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickData {
    pub id: String,
    pub clicked_at: SystemTime,
    /// Traffic-source tag, e.g. "direct", "social", "email".
    pub source: String,
    pub location: String,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

impl ClickData {
    pub fn new(
        clicked_at: SystemTime,
        source: String,
        location: String,
        user_agent: Option<String>,
        ip: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            clicked_at,
            source,
            location,
            user_agent,
            ip,
        }
    }
}

/// Stored short URL mapping.
///
/// Owns its click sequence exclusively; `click_count` always equals
/// `clicks.len()`, maintained through [`ShortUrl::record_click`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrl {
    pub id: String,
    pub original_url: String,
    pub short_code: ShortCode,
    /// Full short URL (base + code) as handed back to the caller.
    pub short_url: String,
    pub validity_minutes: u64,
    /// Set when the code was supplied by the user rather than generated.
    pub custom_code: Option<String>,
    pub created_at: SystemTime,
    /// Always `created_at + validity_minutes`.
    pub expires_at: SystemTime,
    pub click_count: u64,
    /// Insertion order is chronological.
    pub clicks: Vec<ClickData>,
}

impl ShortUrl {
    /// Create a new ShortUrl with a fresh id, zero clicks, and the expiry
    /// derived from the validity window.
    pub fn new(
        original_url: String,
        short_code: ShortCode,
        short_url: String,
        validity_minutes: u64,
        custom_code: Option<String>,
        created_at: SystemTime,
    ) -> Self {
        let expires_at = created_at + Duration::from_secs(validity_minutes * 60);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_url,
            short_code,
            short_url,
            validity_minutes,
            custom_code,
            created_at,
            expires_at,
            click_count: 0,
            clicks: Vec::new(),
        }
    }

    /// Check whether the link has expired at the given instant.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Check whether the link is available for resolution.
    pub fn is_active(&self, now: SystemTime) -> bool {
        !self.is_expired(now)
    }

    /// Append a click, keeping the aggregate count in step with the sequence.
    pub fn record_click(&mut self, click: ClickData) {
        self.clicks.push(click);
        self.click_count = self.clicks.len() as u64;
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Code generator interface; draws candidates until one misses `existing`.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, existing: &HashSet<String>) -> Result<ShortCode, CoreError>;
}

/// Repository port for persisting and loading short URLs.
pub trait UrlRepository: Send + Sync {
    fn get(&self, code: &ShortCode) -> Result<Option<ShortUrl>, CoreError>;
    fn insert(&self, url: ShortUrl) -> Result<(), CoreError>;
    /// Append a click to the link's sequence and bump its count.
    fn record_click(&self, code: &ShortCode, click: ClickData) -> Result<(), CoreError>;
    fn list(&self, limit: usize) -> Result<Vec<ShortUrl>, CoreError>;
    /// User-initiated cleanup; expired links are otherwise only filtered at
    /// read time, never removed.
    fn delete(&self, code: &ShortCode) -> Result<(), CoreError>;
    /// The set of codes currently in use, for collision checks.
    fn existing_codes(&self) -> Result<HashSet<String>, CoreError>;
}

/// Core domain errors (no external error crates to keep deps light).
#[derive(Debug)]
pub enum CoreError {
    /// The original URL violated one or more rules; all are listed.
    InvalidUrl(Vec<UrlIssue>),
    /// The custom code violated one or more rules; all are listed.
    InvalidCode(Vec<CodeIssue>),
    AlreadyExists,
    NotFound,
    /// The link exists but its validity window has passed.
    Expired,
    /// No unique code found within the attempt budget.
    GenerationExhausted { attempts: u32 },
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidUrl(issues) => {
                write!(f, "invalid url: ")?;
                write_issues(f, issues)
            }
            CoreError::InvalidCode(issues) => {
                write!(f, "invalid code: ")?;
                write_issues(f, issues)
            }
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Expired => write!(f, "link expired"),
            CoreError::GenerationExhausted { attempts } => {
                write!(f, "no unique code found after {} attempts", attempts)
            }
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

fn write_issues<T: Display>(f: &mut Formatter<'_>, issues: &[T]) -> std::fmt::Result {
    for (i, issue) in issues.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", issue)?;
    }
    Ok(())
}

impl Error for CoreError {}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} — domain library loaded", pkg, ver)
}

pub mod adapters;
pub mod analytics;
pub mod codegen;
pub mod service;
pub mod validate;
