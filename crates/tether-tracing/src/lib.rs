//! Shared tracing configuration for the tether workspace.
//!
//! Binaries, integration tests and benchmarks install their `tracing`
//! subscriber through this crate so that filters and output formats stay
//! consistent. Library crates only emit events; they never install a
//! subscriber themselves.

pub mod performance;

#[macro_use]
pub mod macros;

pub use tracing;

use std::env;
use std::error::Error;
use std::fmt;

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// How the shared subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives (e.g. `tether_core=debug,info`). When absent the
    /// filter comes from `RUST_LOG`, then from [`Self::default_directive`].
    pub directives: Option<String>,
    /// Fallback directive when neither `directives` nor `RUST_LOG` apply.
    pub default_directive: String,
    /// Whether event targets (module paths) are printed.
    pub include_targets: bool,
    /// ANSI colours. Disable for collected logs.
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Route output through the test harness capture.
    pub test_writer: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, coloured output for local development.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            test_writer: false,
        }
    }

    /// JSON without colours for CI and log collectors.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            ..Self::for_local()
        }
    }

    /// Compact output captured per test; only warnings unless `RUST_LOG` says otherwise.
    pub fn for_tests() -> Self {
        Self {
            default_directive: "warn".to_string(),
            ansi: false,
            output: TracingOutput::Compact,
            test_writer: true,
            ..Self::for_local()
        }
    }

    /// Build a configuration from environment hints.
    ///
    /// # Environment Variables
    ///
    /// - `TETHER_TRACING_PROFILE` - `local` (default), `ci` or `test`
    /// - `TETHER_TRACING_DIRECTIVES` - overrides the filter directives
    /// - `TETHER_TRACING_FORMAT` - `pretty`, `compact` or `json`
    /// - `TETHER_TRACING_SPAN_EVENTS` - `true` to log span close events with timings
    pub fn from_env() -> Self {
        let profile = env::var("TETHER_TRACING_PROFILE")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "test" => Self::for_tests(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var("TETHER_TRACING_DIRECTIVES") {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Ok(format) = env::var("TETHER_TRACING_FORMAT") {
            if let Some(parsed) = TracingOutput::from_env_value(&format) {
                config.output = parsed;
                if config.output == TracingOutput::Json {
                    config.ansi = false;
                }
            }
        }

        if let Ok(span_events) = env::var("TETHER_TRACING_SPAN_EVENTS") {
            if span_events.eq_ignore_ascii_case("true") || span_events == "1" {
                config.span_events = FmtSpan::CLOSE;
            }
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Output format of the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Errors surfaced while installing the subscriber.
#[derive(Debug)]
pub enum TracingSetupError {
    /// The directive string could not be parsed.
    InvalidFilter(String),
    /// A global subscriber is already installed.
    SubscriberInit(tracing_subscriber::util::TryInitError),
}

impl fmt::Display for TracingSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracingSetupError::InvalidFilter(msg) => write!(f, "invalid tracing directive: {msg}"),
            TracingSetupError::SubscriberInit(err) => {
                write!(f, "failed to install global tracing subscriber: {err}")
            }
        }
    }
}

impl Error for TracingSetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TracingSetupError::SubscriberInit(err) => Some(err),
            TracingSetupError::InvalidFilter(_) => None,
        }
    }
}

/// Build a subscriber from the configuration without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.resolve_filter()?;
    Ok(Registry::default().with(format_layer(config)).with(filter))
}

fn format_layer(config: &TracingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = tracing_fmt::layer()
        .with_target(config.include_targets)
        .with_span_events(config.span_events.clone());

    match (config.output, config.test_writer) {
        (TracingOutput::Compact, false) => Box::new(base.compact().with_ansi(config.ansi)),
        (TracingOutput::Compact, true) => Box::new(base.compact().with_ansi(config.ansi).with_test_writer()),
        (TracingOutput::Pretty, false) => Box::new(base.pretty().with_ansi(config.ansi)),
        (TracingOutput::Pretty, true) => Box::new(base.pretty().with_ansi(config.ansi).with_test_writer()),
        (TracingOutput::Json, false) => Box::new(base.json().with_ansi(false)),
        (TracingOutput::Json, true) => Box::new(base.json().with_ansi(false).with_test_writer()),
    }
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)
}

/// Install the test subscriber once per process; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = init_global_tracing(&TracingConfig::for_tests());
}
