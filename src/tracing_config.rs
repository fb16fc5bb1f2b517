//! Tracing subscriber setup for the command line
//!
//! The library only emits events (`log` macros and `tracing` spans); installing
//! a subscriber is left to the binary, which does it through [`TracingConfig`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors and emojis (default for CLI)
    Console,
    /// Compact console output without colors, for CI logs
    Compact,
    /// JSON lines
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where tracing output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Standard error (default)
    Console,
    /// A log file only
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Standard error and a daily rolling log file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it at the very end of `main`
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (0 = info, 1 = debug, 2+ = trace)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directives; overrides verbosity when set
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directives for the configured verbosity
    ///
    /// Inference runtimes are chatty at debug level, so they stay one level
    /// quieter than the crate itself.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info,ort=warn,tract=warn",
            1 => "debug,ort=info,tract=info",
            _ => "trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        let directives = self
            .env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_to_filter());
        Ok(EnvFilter::try_new(directives)?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let registry = Registry::default().with(self.filter()?);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (_, TracingOutput::File(path)) => {
                let (writer, file_guard) = tracing_appender::non_blocking(
                    tracing_appender::rolling::never(log_dir(path), log_file_name(path)),
                );
                guard._file_guard = Some(file_guard);
                let layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                registry.with(layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::Both(path)) => {
                let (writer, file_guard) = tracing_appender::non_blocking(
                    tracing_appender::rolling::daily(log_dir(path), log_file_name(path)),
                );
                guard._file_guard = Some(file_guard);
                let file_layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                let console_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(*format == TracingFormat::Console)
                    .with_target(false)
                    .compact();
                registry.with(console_layer).with(file_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "🚀 Object removal session started");
        }

        Ok(guard)
    }
}

#[cfg(feature = "tracing-files")]
fn log_dir(path: &std::path::Path) -> &std::path::Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
}

#[cfg(feature = "tracing-files")]
fn log_file_name(path: &std::path::Path) -> &std::ffi::OsStr {
    path.file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("objremove.log"))
}

/// Console tracing with a fresh session id
///
/// # Errors
/// - A global subscriber is already installed
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(TracingFormat::Console)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}

/// Span helpers shared by the binary
pub mod spans {
    use tracing::{Level, Span};

    /// One CLI invocation
    pub fn session(session_id: &str, model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            model_name = %model_name,
            provider = %provider
        )
    }

    /// One input video
    pub fn video_processing(input: &std::path::Path, target_class: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "video_processing",
            input = %input.display(),
            target_class = %target_class
        )
    }

    /// Fetching the detector model
    pub fn download(url: &str) -> Span {
        tracing::span!(Level::INFO, "download", url = %url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert!(TracingConfig::new().verbosity_to_filter().starts_with("info"));
        assert!(TracingConfig::new().with_verbosity(1).verbosity_to_filter().starts_with("debug"));
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(9).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_filters_parse() {
        for verbosity in 0..3 {
            assert!(TracingConfig::new().with_verbosity(verbosity).filter().is_ok());
        }
        assert!(TracingConfig::new()
            .with_env_filter("imgly_objremove=trace")
            .filter()
            .is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.output, TracingOutput::Console);
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }
}
