//! Structured logging for the scheduler.
//!
//! Log levels:
//! - ERROR: Violated invariants, immediately before the process aborts
//! - WARN: Unexpected but recoverable conditions (config fallbacks, slow waits)
//! - INFO: Manager lifecycle (startup, drain, shutdown)
//! - DEBUG: Task submission, transactions and state transitions
//! - TRACE: Per-tick polling and lane operation traces
//!
//! Nothing is written until [`init`] (or a sibling) picks a sink. Debug mode
//! can be enabled with `--debug` or the `EVENTSYS_DEBUG=1` env var.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Initialize logging to ~/.eventsys/eventsys.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging to the default location with explicit debug mode.
pub fn init_with_debug(debug: bool) {
    let path = dirs::home_dir().map(|h| h.join(".eventsys").join("eventsys.log"));
    init_with_path(path, debug);
}

/// Initialize logging to an explicit file. `None` keeps the level settings
/// but writes nothing.
pub fn init_with_path(path: Option<PathBuf>, debug: bool) {
    let env_debug = std::env::var("EVENTSYS_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let debug_enabled = debug || env_debug;
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let level = if debug_enabled {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    if let Some(path) = path {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        // Truncate file on startup
        let _ = std::fs::write(&path, "");
        LOG_PATH.set(path).ok();
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Set the minimum log level for output.
pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Get the current log level.
pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Whether a message at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    LOG_PATH.get().is_some() && level <= get_level()
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }

    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let thread = std::thread::current();
            let _ = writeln!(
                file,
                "[{}] [{}] [{}] {}",
                timestamp,
                level.as_str(),
                thread.name().unwrap_or("-"),
                msg
            );
        }
    }
}

/// Log a message at INFO level.
pub fn log(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log a message at ERROR level.
pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

/// Log a message at WARN level.
pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

/// Log a message at INFO level.
pub fn info(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log a message at DEBUG level (only in debug mode).
pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

/// Log a message at TRACE level (very verbose).
pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! elog {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Info) {
            $crate::log::log(&format!($($arg)*))
        }
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! elog_error {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Error) {
            $crate::log::error(&format!($($arg)*))
        }
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! elog_warn {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Warn) {
            $crate::log::warn(&format!($($arg)*))
        }
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! elog_debug {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Debug) {
            $crate::log::debug(&format!($($arg)*))
        }
    };
}

/// Log macro for TRACE level. The tick loop logs here, so formatting is
/// skipped entirely unless the level is active.
#[macro_export]
macro_rules! elog_trace {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Trace) {
            $crate::log::trace(&format!($($arg)*))
        }
    };
}
