//! Logging infrastructure - structured tracing throughout the heap
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - File and console output

use once_cell::sync::OnceCell;
use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; `None` keeps output on the console only
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // LOAM_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("LOAM_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // LOAM_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("LOAM_LOG_FILE") {
            config.log_path = Some(path);
        }

        // LOAM_LOG_JSON: enable JSON format
        config.json_format = std::env::var("LOAM_LOG_JSON").is_ok();

        // LOAM_LOG_SPANS: show span events
        config.show_spans = std::env::var("LOAM_LOG_SPANS").is_ok();

        config
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "loam_heap={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let mut layers = Vec::new();

        let console = fmt::layer()
            .with_writer(io::stdout)
            .with_span_events(span_events)
            .with_target(true);
        if config.json_format {
            layers.push(console.json().boxed());
        } else {
            layers.push(console.boxed());
        }

        if let Some(path) = &config.log_path {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().unwrap_or_else(|| "loam_heap.log".as_ref());
            let appender = tracing_appender::rolling::never(dir, file);
            layers.push(fmt::layer().with_ansi(false).with_writer(appender).boxed());
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layers)
            .init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Heap-specific logging functions
// ============================================================================

/// Log memory allocation
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    use tracing::trace;
    trace!(
        event = "allocation",
        size_bytes = size,
        address = ?ptr,
        "Memory allocated"
    );
}

/// Log collection cycle start
pub fn log_gc_start(collector: &str, root_count: usize) {
    use tracing::info;
    info!(
        event = "gc_start",
        collector = collector,
        roots = root_count,
        "Starting collection cycle"
    );
}

/// Log collection cycle completion
pub fn log_gc_complete(duration_us: u64, reclaimed_bytes: usize, live_objects: usize) {
    use tracing::info;
    info!(
        event = "gc_complete",
        reclaimed_bytes = reclaimed_bytes,
        live_objects = live_objects,
        duration_us = duration_us,
        "Collection cycle complete"
    );
}
