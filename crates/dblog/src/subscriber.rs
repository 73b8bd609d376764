//! Process-wide subscriber setup
//!
//! [`DbLogSubscriberBuilder`] assembles an `EnvFilter`, console output,
//! optional rolling file output and an optional [`StoreLayer`] into one
//! registry.
//!
//! ```ignore
//! use dblog::{DbLogConfig, DbLogSubscriberBuilder, DatabaseLogWriter, StoreLayer};
//!
//! let config = DbLogConfig::load("dblog.toml")?;
//! let writer = DatabaseLogWriter::from_config(&config).await?;
//! let (layer, sink) = StoreLayer::spawn(writer, config.failure_policy);
//!
//! let _guard = DbLogSubscriberBuilder::new()
//!     .with_config(config.logging)
//!     .with_verbosity(1, 0)
//!     .with_store_layer(layer)
//!     .try_init()?;
//! ```

use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{FileConfig, LoggingConfig, RotationStrategy};
use crate::error::InitError;
use crate::format::FixedWidthFormatter;
use crate::layer::StoreLayer;

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

/// Level names from quietest to loudest
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Move `default` by `verbose - quiet` steps, staying within error..trace
///
/// A default that is not a plain level name is kept as is unless the
/// counts ask for a change, in which case it is treated as `info`.
pub fn adjusted_level(default: &str, verbose: u8, quiet: u8) -> String {
    let shift = i32::from(verbose) - i32::from(quiet);
    let current = LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(default.trim()));

    match (current, shift) {
        (None, 0) => default.to_string(),
        (current, shift) => {
            let index = current.unwrap_or(2) as i32 + shift;
            LEVELS[index.clamp(0, LEVELS.len() as i32 - 1) as usize].to_string()
        }
    }
}

/// Builder for the process subscriber
pub struct DbLogSubscriberBuilder {
    config: LoggingConfig,
    verbose: u8,
    quiet: u8,
    store_layer: Option<StoreLayer>,
}

impl DbLogSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LoggingConfig::default(),
            verbose: 0,
            quiet: 0,
            store_layer: None,
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LoggingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// `-v` / `-q` counts from the command line
    pub fn with_verbosity(mut self, verbose: u8, quiet: u8) -> Self {
        self.verbose = verbose;
        self.quiet = quiet;
        self
    }

    /// Log `target` at debug level whatever the default level
    pub fn with_debug_target(mut self, target: impl Into<String>) -> Self {
        self.config.debug_targets.push(target.into());
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Also send every event to the store
    pub fn with_store_layer(mut self, layer: StoreLayer) -> Self {
        self.store_layer = Some(layer);
        self
    }

    /// Filter directive string the builder will install
    pub fn directives(&self) -> String {
        let mut directives = vec![adjusted_level(
            &self.config.default_level,
            self.verbose,
            self.quiet,
        )];
        directives.extend(
            self.config
                .debug_targets
                .iter()
                .map(|target| format!("{target}=debug")),
        );
        directives.join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, InitError> {
        let directives = self.directives();
        Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directives))?)
    }

    fn console_layer(&self) -> BoxedLayer {
        let console = &self.config.console;
        if console.json {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(io::stderr)
                .boxed()
        } else if console.ansi {
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_target(true)
                .with_writer(io::stderr)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .event_format(FixedWidthFormatter::new())
                .with_ansi(false)
                .with_writer(io::stderr)
                .boxed()
        }
    }

    fn file_layer(file_config: &FileConfig) -> Result<(BoxedLayer, WorkerGuard), InitError> {
        let rotation = match file_config.rotation {
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Never => Rotation::NEVER,
        };
        let appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(&file_config.prefix)
            .filename_suffix("log")
            .build(&file_config.directory)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(non_blocking)
            .boxed();
        Ok((layer, guard))
    }

    /// Install the subscriber globally
    ///
    /// The returned guard keeps the file writer alive and has to be held
    /// until the program exits.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, InitError> {
        let env_filter = self.env_filter()?;
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }
        if let Some(file_config) = &self.config.file {
            let (layer, file_guard) = Self::file_layer(file_config)?;
            layers.push(layer);
            guard = Some(file_guard);
        }
        if let Some(store_layer) = self.store_layer {
            layers.push(store_layer.boxed());
        }

        Registry::default()
            .with(env_filter)
            .with(layers)
            .try_init()?;
        Ok(guard)
    }
}

impl Default for DbLogSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjusted_level() {
        assert_eq!(adjusted_level("info", 0, 0), "info");
        assert_eq!(adjusted_level("info", 1, 0), "debug");
        assert_eq!(adjusted_level("INFO", 2, 0), "trace");
        assert_eq!(adjusted_level("info", 5, 0), "trace");
        assert_eq!(adjusted_level("info", 0, 1), "warn");
        assert_eq!(adjusted_level("info", 0, 9), "error");
        assert_eq!(adjusted_level("warn", 2, 1), "info");
    }

    #[test]
    fn test_compound_default_level() {
        assert_eq!(adjusted_level("info,redb=warn", 0, 0), "info,redb=warn");
        assert_eq!(adjusted_level("info,redb=warn", 1, 0), "debug");
    }

    #[test]
    fn test_directives() {
        let builder = DbLogSubscriberBuilder::new()
            .with_level("warn")
            .with_verbosity(1, 0)
            .with_debug_target("dblog::query")
            .with_debug_target("app");
        assert_eq!(builder.directives(), "info,dblog::query=debug,app=debug");
        assert!(EnvFilter::try_new(builder.directives()).is_ok());
    }

    #[test]
    fn test_builder_with_config() {
        let config = LoggingConfig {
            default_level: "debug".to_string(),
            ..Default::default()
        };
        let builder = DbLogSubscriberBuilder::new().with_config(config);
        assert_eq!(builder.directives(), "debug");
        assert!(builder.config.console.enabled);
    }

    #[test]
    fn test_builder_with_console() {
        let builder = DbLogSubscriberBuilder::new().with_console(false);
        assert!(!builder.config.console.enabled);
        assert!(builder.store_layer.is_none());
    }
}
