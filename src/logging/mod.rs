//! Logging infrastructure - structured tracing throughout the runtime
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - One target per subsystem (`class`, `registry`, `refcount`, `sort`, `runtime`)
//! - Zero cost when disabled
//! - Console or daily-rotated file output

use once_cell::sync::OnceCell;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

// Re-export tracing macros for use throughout the runtime
pub use tracing::{debug, error, info, trace, warn, Level};

/// Event targets emitted by the runtime's subsystems
pub const TARGETS: [&str; 5] = ["runtime", "class", "registry", "refcount", "sort"];

/// Global logging state; holds the appender guard for the process lifetime
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated file
    File { directory: String, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Show span events (new/close)
    pub span_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // CFISH_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("CFISH_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // CFISH_LOG_FILE: directory for rotated log files
        if let Ok(directory) = std::env::var("CFISH_LOG_FILE") {
            config.output = LogOutput::File {
                directory,
                prefix: "cfish_runtime".to_string(),
            };
        }

        if std::env::var("CFISH_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }
        config.span_events = std::env::var("CFISH_LOG_SPANS").is_ok();

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }
}

/// Parse a level name as used in config files and the environment
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration (idempotent)
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

        let (writer, guard) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(rolling::daily(directory, prefix))
            }
        };

        let span_events = if config.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions));

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().boxed(),
        };

        // Another subscriber may already be installed (tests, embedding hosts)
        let installed = tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .is_ok();

        installed.then_some(guard)
    });
}

/// One directive per subsystem target, all at `level`
pub fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    let directives: Vec<String> = TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .chain(std::iter::once(format!("cfish_runtime={level}")))
        .collect();
    EnvFilter::new(directives.join(","))
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Runtime-specific logging functions
// ============================================================================

/// Log a parcel bootstrap
#[inline]
pub fn log_parcel_bootstrap(parcel_id: i32, num_classes: usize) {
    debug!(
        target: "class",
        event = "parcel_bootstrap",
        parcel_id,
        classes = num_classes,
        "parcel bootstrapped"
    );
}

/// Log a class registration
#[inline]
pub fn log_class_registered(name: &str, parcel_id: i32, class_alloc_size: u32) {
    trace!(
        target: "registry",
        event = "class_registered",
        class = name,
        parcel_id,
        class_alloc_size,
        "class registered"
    );
}

/// Log creation of a dynamic subclass
#[inline]
pub fn log_singleton_created(name: &str, parent: &str, host_overrides: usize) {
    debug!(
        target: "class",
        event = "singleton_created",
        class = name,
        parent,
        host_overrides,
        "dynamic subclass created"
    );
}

/// Log object destruction
#[inline]
pub fn log_object_destroyed(class: &str, ptr: *const u8) {
    trace!(
        target: "refcount",
        event = "destroy",
        class,
        address = ?ptr,
        "object destroyed"
    );
}

/// Log a sort engine refill
#[inline]
pub fn log_refill(runs: usize, slices: usize, absorbed: usize) {
    trace!(
        target: "sort",
        event = "refill",
        runs,
        slices,
        absorbed,
        "refilled merge buffer"
    );
}

/// Log runtime initialization
#[inline]
pub fn log_runtime_init(registry_capacity: usize) {
    info!(
        target: "runtime",
        event = "runtime_init",
        registry_capacity,
        "cfish runtime initialized"
    );
}
