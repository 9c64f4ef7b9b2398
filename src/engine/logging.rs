//! Logging and tracing configuration
//!
//! Centralized subscriber setup for the engine and its binary. File output goes
//! through a non-blocking daily rolling appender; the appender's worker guards
//! are handed back as a [`LoggingGuard`] that must outlive the program's work.

use std::io;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Error type returned by subscriber initialization
pub type LoggingError = Box<dyn std::error::Error + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for the engine crate
    pub level: Level,
    /// Whether console output is JSON
    pub json_format: bool,
    /// Whether to also log to a rolling file
    pub log_to_file: bool,
    /// Directory for rolling files, `logs` when unset
    pub log_directory: Option<String>,
    /// File name prefix of the rolling files
    pub log_file_prefix: String,
    /// Whether to emit span open/close events
    pub enable_span_events: bool,
    /// Colored console output
    pub enable_ansi: bool,
    /// Custom environment filter, overrides `level`
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            log_to_file: false,
            log_directory: None,
            log_file_prefix: "access-rule-engine".to_string(),
            enable_span_events: false,
            enable_ansi: true,
            env_filter: None,
        }
    }
}

/// Keeps the non-blocking writers flushing until dropped
#[must_use = "dropping the guard stops background log writers"]
#[derive(Debug, Default)]
pub struct LoggingGuard {
    guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    /// Number of background writers held
    pub fn writer_count(&self) -> usize {
        self.guards.len()
    }
}

impl LoggingConfig {
    /// Configuration with INFO console output only
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Write console output as JSON lines
    pub fn with_json_format(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Enable file logging
    pub fn with_file_logging(mut self, directory: impl Into<String>) -> Self {
        self.log_to_file = true;
        self.log_directory = Some(directory.into());
        self
    }

    /// Set log file prefix
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_file_prefix = prefix.into();
        self
    }

    /// Enable span events
    pub fn with_span_events(mut self) -> Self {
        self.enable_span_events = true;
        self
    }

    /// Disable ANSI colors
    pub fn without_ansi(mut self) -> Self {
        self.enable_ansi = false;
        self
    }

    /// Replace the level with an `EnvFilter` directive
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Filter directive used when neither `env_filter` nor `RUST_LOG` is set
    pub fn default_directive(&self) -> String {
        format!(
            "{}={}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
            self.level
        )
    }

    fn build_filter(&self) -> Result<EnvFilter, LoggingError> {
        match &self.env_filter {
            Some(filter) => Ok(EnvFilter::try_new(filter)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    /// Install the global tracing subscriber
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(self) -> Result<LoggingGuard, LoggingError> {
        let registry = Registry::default().with(self.build_filter()?);
        let mut guard = LoggingGuard::default();

        if self.log_to_file {
            let log_dir = self.log_directory.as_deref().unwrap_or("logs");
            let (file_writer, file_guard) =
                non_blocking(rolling::daily(log_dir, &self.log_file_prefix));
            let (console_writer, console_guard) = non_blocking(io::stderr());
            guard.guards.push(file_guard);
            guard.guards.push(console_guard);

            // Files are always JSON so they can be shipped as-is.
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_span_events(self.span_events());

            if self.json_format {
                let console_layer = fmt::layer()
                    .json()
                    .with_writer(console_writer)
                    .with_span_events(self.span_events());
                registry.with(file_layer).with(console_layer).try_init()?;
            } else {
                let console_layer = fmt::layer()
                    .pretty()
                    .with_writer(console_writer)
                    .with_ansi(self.enable_ansi)
                    .with_span_events(self.span_events());
                registry.with(file_layer).with(console_layer).try_init()?;
            }
        } else if self.json_format {
            let layer = fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(self.span_events());
            registry.with(layer).try_init()?;
        } else {
            let layer = fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_ansi(self.enable_ansi)
                .with_span_events(self.span_events());
            registry.with(layer).try_init()?;
        }

        info!(
            level = %self.level,
            json = self.json_format,
            file = self.log_to_file,
            "Logging initialized"
        );
        Ok(guard)
    }

    /// Production logging: JSON console plus daily rolling JSON files
    pub fn init_prod(log_dir: impl Into<String>) -> Result<LoggingGuard, LoggingError> {
        Self::new()
            .with_level(Level::INFO)
            .with_json_format()
            .with_file_logging(log_dir)
            .without_ansi()
            .init()
    }

    /// Minimal output for tests
    pub fn init_test() -> Result<LoggingGuard, LoggingError> {
        Self::new().with_level(Level::WARN).without_ansi().init()
    }

    /// INFO level with span events
    pub fn init_verbose() -> Result<LoggingGuard, LoggingError> {
        Self::new().with_level(Level::INFO).with_span_events().init()
    }

    /// DEBUG level with span events
    pub fn init_debug() -> Result<LoggingGuard, LoggingError> {
        Self::new().with_level(Level::DEBUG).with_span_events().init()
    }
}

/// Structured log event tagged with the engine component that produced it
///
/// ```
/// use access_rule_engine::engine_event;
///
/// engine_event!(info, "interlock", "rule fired", rule = "RULE_1", target = "AREA_2");
/// engine_event!(debug, "linkage", "nothing matched");
/// ```
#[macro_export]
macro_rules! engine_event {
    ($level:ident, $component:expr, $message:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::$level!(
            message = $message,
            component = $component,
            $($key = $value,)*
        )
    };
    ($level:ident, $component:expr, $message:expr $(,)?) => {
        tracing::$level!(message = $message, component = $component)
    };
}

/// Span covering the evaluation or execution of one rule
///
/// ```
/// use access_rule_engine::rule_span;
///
/// let span = rule_span!("linkage_execute", rule = "RULE_7");
/// let _entered = span.enter();
/// ```
#[macro_export]
macro_rules! rule_span {
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info_span!($name, component = "rules", $($key = $value,)*)
    };
    ($name:expr $(,)?) => {
        tracing::info_span!($name, component = "rules")
    };
}
