//! Logging setup for service-injector
//!
//! Registry construction, service creation and closing are traced under the
//! `service_injector` target. This module installs a `tracing-subscriber`
//! for applications that have none of their own.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - JSON structured output
//! - `logging-pretty` - Human readable multi-line output
//!
//! # Example
//!
//! ```rust,ignore
//! use service_injector::logging;
//!
//! // Format picked from the enabled features
//! logging::init();
//!
//! // Or configure it
//! logging::builder()
//!     .trace()
//!     .injector_only()
//!     .from_env()
//!     .compact()
//!     .init();
//! ```

use tracing::Level;

/// Target of every event emitted by this crate
pub const TARGET: &str = "service_injector";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single line per event
    Compact,
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    targets: Vec<&'static str>,
    from_env: bool,
    source_location: bool,
    thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            targets: Vec::new(),
            from_env: false,
            source_location: false,
            thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Also show per-lookup and cache-hit events
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only show events of `target`; may be called repeatedly
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.targets.push(target);
        self
    }

    /// Only show this crate's events
    pub fn injector_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Prefer `RUST_LOG` when it is set
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    /// Include file names and line numbers
    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directives for the configured level and targets
    pub fn directives(&self) -> String {
        if self.targets.is_empty() {
            return self.level.to_string().to_lowercase();
        }
        self.targets
            .iter()
            .map(|target| format!("{}={}", target, self.level.to_string().to_lowercase()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the subscriber globally.
    ///
    /// Fails when a global subscriber is already installed.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
        } else {
            EnvFilter::new(self.directives())
        };

        let layer = fmt::layer()
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_thread_ids(self.thread_ids)
            .with_target(true);
        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => layer.json().boxed(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
    }

    /// Install the subscriber globally, keeping an existing one
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        if let Err(err) = self.try_init() {
            tracing::warn!(target: TARGET, error = %err, "Subscriber already installed");
        }
    }

    /// No-op without `logging-json` or `logging-pretty`
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON when `logging-json` is enabled, pretty otherwise
pub fn init() {
    #[cfg(feature = "logging-json")]
    init_json();
    #[cfg(not(feature = "logging-json"))]
    init_pretty();
}

/// JSON structured logging at debug level
///
/// ```json
/// {"timestamp":"2024-01-01T00:00:00.000Z","level":"DEBUG","fields":{"message":"Service added","service":"db","priority":0},"target":"service_injector"}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// Pretty logging at debug level
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Debug logging of this crate's events only
pub fn init_injector_only() {
    builder().injector_only().debug().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.targets.is_empty());
        assert_eq!(builder.directives(), "debug");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .compact()
            .with_source_location()
            .injector_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.source_location);
        assert_eq!(builder.directives(), "service_injector=trace");
    }

    #[test]
    fn test_directives_for_several_targets() {
        let builder = builder().info().injector_only().with_target_filter("app");
        assert_eq!(builder.directives(), "service_injector=info,app=info");
    }
}
