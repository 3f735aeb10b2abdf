//! The log event model: fixed enumerations for origin, severity, and
//! category, so an invalid tag cannot be constructed. String conversions
//! live at the boundary and fail with `None` rather than panicking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the event originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Frontend,
    Backend,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Frontend => "frontend",
            Origin::Backend => "backend",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "frontend" => Some(Origin::Frontend),
            "backend" => Some(Origin::Backend),
            _ => None,
        }
    }
}

/// Severity, ordered debug < info < warn < error < fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }
}

/// Which part of the application the event concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Api,
    Component,
    Page,
    State,
    Utils,
    Auth,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Api => "api",
            Category::Component => "component",
            Category::Page => "page",
            Category::State => "state",
            Category::Utils => "utils",
            Category::Auth => "auth",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "api" => Some(Category::Api),
            "component" => Some(Category::Component),
            "page" => Some(Category::Page),
            "state" => Some(Category::State),
            "utils" => Some(Category::Utils),
            "auth" => Some(Category::Auth),
            _ => None,
        }
    }
}

/// One record of a loggable occurrence. Created at the call site, handed to
/// the dispatcher, discarded after delivery succeeds or retries exhaust.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub origin: Origin,
    pub level: Level,
    pub category: Category,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl LogEvent {
    pub fn new(
        origin: Origin,
        level: Level,
        category: Category,
        message: impl Into<String>,
    ) -> Self {
        Self {
            origin,
            level,
            category,
            message: message.into(),
            timestamp: None,
            context: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn tag_parsing_roundtrips() {
        for level in [
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
            Level::Fatal,
        ] {
            assert_eq!(Level::parse(level.as_str()), Some(level));
        }
        for origin in [Origin::Frontend, Origin::Backend] {
            assert_eq!(Origin::parse(origin.as_str()), Some(origin));
        }
        for category in [
            Category::Api,
            Category::Component,
            Category::Page,
            Category::State,
            Category::Utils,
            Category::Auth,
        ] {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn unknown_tags_fail_construction() {
        assert_eq!(Level::parse("verbose"), None);
        assert_eq!(Origin::parse("middleware"), None);
        assert_eq!(Category::parse("database"), None);
    }

    #[test]
    fn serializes_with_lowercase_tags_and_omits_absent_fields() {
        let event = LogEvent::new(
            Origin::Frontend,
            Level::Warn,
            Category::Api,
            "request slow",
        );
        let value = serde_json::to_value(&event).expect("serializable");
        assert_eq!(
            value,
            serde_json::json!({
                "origin": "frontend",
                "level": "warn",
                "category": "api",
                "message": "request slow",
            })
        );
    }
}
