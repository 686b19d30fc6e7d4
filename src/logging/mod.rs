//! Logging infrastructure - structured tracing for the memory substrate
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable level and format (compact, pretty, JSON)
//! - `RUST_LOG` taking precedence over the configured level
//! - Optional daily-rolling file output via `tracing-appender`
//! - Zero cost on the bump-allocation fast path, which never logs
//!
//! Targets: `vmcore::arena`, `vmcore::pool`, `vmcore::virt_space`, `vmcore::os`.

use std::io;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn, Level};

/// Set once the global subscriber has been installed (or installation was attempted)
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing for the life of the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Output format
    pub format: LogFormat,
    /// Directory for daily-rolling log files; stdout when unset
    pub file: Option<PathBuf>,
    /// Show span events (enter/close)
    pub spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            file: None,
            spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // VMCORE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("VMCORE_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // VMCORE_LOG_FILE: directory for rolling log files
        if let Ok(dir) = std::env::var("VMCORE_LOG_FILE") {
            config.file = Some(PathBuf::from(dir));
        }

        if std::env::var("VMCORE_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }

        config.spans = std::env::var("VMCORE_LOG_SPANS").is_ok();

        config
    }

    /// Minimal logging for benchmarks and production embedding
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Verbose logging, including every chunk movement and span
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            format: LogFormat::Pretty,
            file: None,
            spans: true,
        }
    }
}

/// Parse a level name (case-insensitive)
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

/// Initialize logging with custom configuration
///
/// Idempotent: only the first call installs a subscriber. If another
/// subscriber is already set globally, that one stays in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("vmcore={}", config.level.as_str().to_lowercase()))
        });

        let layer = match &config.file {
            Some(dir) => {
                let appender = tracing_appender::rolling::daily(dir, "vmcore.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                output_layer(&config, writer)
            }
            None => output_layer(&config, io::stdout),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(env_filter)
            .try_init()
            .ok();
    });
}

fn output_layer<W>(config: &LogConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if config.spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events)
        .with_target(true)
        .with_thread_ids(cfg!(debug_assertions));

    match config.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Memory-specific logging functions
// ============================================================================

/// Log an arena acquiring a new active chunk
#[inline]
pub fn log_arena_grown(request: usize, chunk_len: usize, chunk_count: usize) {
    debug!(
        target: "vmcore::arena",
        request,
        chunk_len,
        chunk_count,
        "arena grew by a chunk"
    );
}

/// Log an arena rolled back to a mark
#[inline]
pub fn log_arena_restored(released_chunks: usize, chunk_count: usize) {
    trace!(
        target: "vmcore::arena",
        released_chunks,
        chunk_count,
        "arena restored to mark"
    );
}

/// Log an address-space reservation
#[inline]
pub fn log_reserve(start: usize, size: usize, alignment: usize, executable: bool) {
    debug!(
        target: "vmcore::virt_space",
        start = ?(start as *const u8),
        size,
        alignment,
        executable,
        "reserved address space"
    );
}

/// Log a commit of pages at the top of a space
#[inline]
pub fn log_commit(addr: usize, size: usize, committed: usize, pretouch: bool) {
    debug!(
        target: "vmcore::virt_space",
        addr = ?(addr as *const u8),
        size,
        committed,
        pretouch,
        "committed memory"
    );
}

/// Log an uncommit of pages at the top of a space
#[inline]
pub fn log_uncommit(addr: usize, size: usize, committed: usize) {
    debug!(
        target: "vmcore::virt_space",
        addr = ?(addr as *const u8),
        size,
        committed,
        "uncommitted memory"
    );
}

/// Log a reservation returned to the OS
#[inline]
pub fn log_release(start: usize, size: usize) {
    debug!(
        target: "vmcore::virt_space",
        start = ?(start as *const u8),
        size,
        "released address space"
    );
}

/// Log a failed OS memory call
#[inline]
pub fn log_os_failure(operation: &str, addr: usize, size: usize) {
    warn!(
        target: "vmcore::os",
        operation,
        addr = ?(addr as *const u8),
        size,
        error = %std::io::Error::last_os_error(),
        "OS memory operation failed"
    );
}

/// Log runtime initialization
pub fn log_runtime_init() {
    info!(target: "vmcore", "vmcore memory substrate initialized");
}

/// Log runtime shutdown
pub fn log_runtime_shutdown(freed_chunks: usize) {
    info!(
        target: "vmcore",
        freed_chunks,
        "vmcore memory substrate shutting down"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                target: "vmcore::perf",
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.file.is_none());
        assert_eq!(config.format, LogFormat::Compact);

        assert_eq!(LogConfig::performance().level, Level::ERROR);
        assert_eq!(LogConfig::debug().level, Level::TRACE);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_idempotent() {
        init_with_config(LogConfig::performance());
        init_with_config(LogConfig::debug());
        assert!(is_initialized());
    }

    #[test]
    fn test_logging_functions() {
        // These should not panic
        log_arena_grown(30, 216, 2);
        log_arena_restored(1, 1);
        log_reserve(0x1000, 4096, 4096, false);
        log_commit(0x1000, 4096, 4096, true);
        log_uncommit(0x1000, 4096, 0);
        log_release(0x1000, 4096);
        log_runtime_init();
        log_runtime_shutdown(0);
        let _guard = perf::track("noop");
    }
}
