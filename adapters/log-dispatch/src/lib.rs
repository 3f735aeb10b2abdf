//! log-dispatch — best-effort delivery of structured log events to a remote
//! collector.
//!
//! Purpose
//! - Accept structured log events from anywhere in the application,
//!   optionally mirror them onto the local tracing subscriber, and forward
//!   them to a remote collection endpoint with bounded retries.
//! - Delivery is fire-and-forget with respect to application correctness:
//!   `submit` never returns an error and never panics. The outcome is an
//!   explicit [`Delivery`] value so callers that care can still observe
//!   exhaustion.
//!
//! API
//! - `Dispatcher::submit(event)` → `Delivered(response) | Exhausted`
//! - Per-level entry points (`debug`/`info`/`warn`/`error`/`fatal`) fix the
//!   severity and forward to `submit`.
//!
//! Notes
//! - Backoff is linear: the wait between attempt `i` and `i+1` is
//!   `base_delay * i`.
//! - The transport is a port so tests can script attempt outcomes; the
//!   shipped implementation posts JSON with `reqwest`.

pub mod event;

pub use event::{Category, Level, LogEvent, Origin};

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace};

/// Default number of delivery attempts per event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay unit for the linear backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// One attempt's failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("collector returned status {0}")]
    Status(u16),
}

/// Outcome of a submission. Exhaustion covers both "all retries failed" and
/// "no collector configured"; both are best-effort telemetry to the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// The collector accepted the event; its response payload is attached.
    Delivered(serde_json::Value),
    /// The retry budget ran out without a successful response.
    Exhausted,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered(_))
    }

    pub fn response(&self) -> Option<&serde_json::Value> {
        match self {
            Delivery::Delivered(value) => Some(value),
            Delivery::Exhausted => None,
        }
    }
}

/// Delivery port: one outbound call per attempt.
pub trait Transport: Send + Sync {
    fn deliver(
        &self,
        event: &LogEvent,
    ) -> impl Future<Output = Result<serde_json::Value, TransportError>> + Send;
}

/// Local mirror port; the console side of the dispatcher.
pub trait Mirror: Send + Sync {
    fn write(&self, event: &LogEvent);
}

/// Mirrors events onto the local tracing subscriber. Never blocks, never
/// fails the submission.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleMirror;

impl Mirror for ConsoleMirror {
    fn write(&self, event: &LogEvent) {
        let origin = event.origin.as_str();
        let category = event.category.as_str();
        match event.level {
            Level::Debug => tracing::debug!(origin, category, "{}", event.message),
            Level::Info => tracing::info!(origin, category, "{}", event.message),
            Level::Warn => tracing::warn!(origin, category, "{}", event.message),
            Level::Error => tracing::error!(origin, category, "{}", event.message),
            Level::Fatal => tracing::error!(origin, category, fatal = true, "{}", event.message),
        }
    }
}

/// HTTP delivery via `reqwest`: posts the event as JSON and expects a JSON
/// response payload. Any non-success status or transport error is one failed
/// attempt.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, event: &LogEvent) -> Result<serde_json::Value, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}

/// Dispatcher configuration.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Delivery attempts per event.
    pub max_attempts: u32,
    /// Base delay unit; attempt `i+1` waits `base_delay * i`.
    pub base_delay: Duration,
    /// Whether to mirror events onto the local subscriber.
    pub mirror: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            mirror: true,
        }
    }
}

/// The wait before `next_attempt` (1-based). Linear in the attempt index:
/// nothing before the first attempt, then base, 2*base, ...
pub fn backoff_delay(base: Duration, next_attempt: u32) -> Duration {
    base * next_attempt.saturating_sub(1)
}

/// Best-effort log event dispatcher.
pub struct Dispatcher<T: Transport, M: Mirror = ConsoleMirror> {
    transport: Option<T>,
    mirror: M,
    config: DispatchConfig,
}

impl<T: Transport> Dispatcher<T> {
    /// Dispatcher with the default console mirror. `None` for the transport
    /// means no collector is configured; events are mirrored and dropped.
    pub fn new(transport: Option<T>, config: DispatchConfig) -> Self {
        Self::with_mirror(transport, ConsoleMirror, config)
    }
}

impl<T: Transport, M: Mirror> Dispatcher<T, M> {
    pub fn with_mirror(transport: Option<T>, mirror: M, config: DispatchConfig) -> Self {
        Self {
            transport,
            mirror,
            config,
        }
    }

    /// Submit one event: mirror it (if enabled), then attempt delivery up to
    /// the configured budget with linear backoff between attempts. The first
    /// successful response wins; a spent budget degrades to `Exhausted`.
    pub async fn submit(&self, event: LogEvent) -> Delivery {
        if self.config.mirror {
            self.mirror.write(&event);
        }

        let Some(transport) = &self.transport else {
            trace!("no collector configured, dropping event");
            return Delivery::Exhausted;
        };

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff_delay(self.config.base_delay, attempt)).await;
            }
            match transport.deliver(&event).await {
                Ok(response) => {
                    trace!(attempt, "log event delivered");
                    return Delivery::Delivered(response);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "log delivery attempt failed");
                }
            }
        }

        debug!(
            attempts = self.config.max_attempts,
            "log delivery exhausted"
        );
        Delivery::Exhausted
    }

    pub async fn debug(
        &self,
        origin: Origin,
        category: Category,
        message: impl Into<String>,
    ) -> Delivery {
        self.submit(LogEvent::new(origin, Level::Debug, category, message))
            .await
    }

    pub async fn info(
        &self,
        origin: Origin,
        category: Category,
        message: impl Into<String>,
    ) -> Delivery {
        self.submit(LogEvent::new(origin, Level::Info, category, message))
            .await
    }

    pub async fn warn(
        &self,
        origin: Origin,
        category: Category,
        message: impl Into<String>,
    ) -> Delivery {
        self.submit(LogEvent::new(origin, Level::Warn, category, message))
            .await
    }

    pub async fn error(
        &self,
        origin: Origin,
        category: Category,
        message: impl Into<String>,
    ) -> Delivery {
        self.submit(LogEvent::new(origin, Level::Error, category, message))
            .await
    }

    pub async fn fatal(
        &self,
        origin: Origin,
        category: Category,
        message: impl Into<String>,
    ) -> Delivery {
        self.submit(LogEvent::new(origin, Level::Fatal, category, message))
            .await
    }
}
