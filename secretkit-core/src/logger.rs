use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Sink for log records produced by this crate.
///
/// The host app implements this to route records into its own logging (Logcat,
/// `os_log`, a test buffer). It is exported via `UniFFI` when the `ffi`
/// feature is enabled.
///
/// # Examples
///
/// ```rust
/// use secretkit_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// object SecretKitLogBridge : Logger {
///     override fun log(level: LogLevel, message: String) {
///         Log.println(level.toPriority(), "SecretKit", message)
///     }
/// }
///
/// setLogger(SecretKitLogBridge) // once, in Application.onCreate
/// ```
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity level of the log message.
    /// * `message` - The log message to be recorded.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log record, also used as the minimum level to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Very low priority, extremely detailed messages.
    Trace,
    /// Lower priority debugging information.
    Debug,
    /// Progress of normal operations.
    Info,
    /// Potentially harmful situations, e.g. a secret that could not be read.
    Warn,
    /// Failures the caller will see as errors.
    Error,
}

/// `log::Log` implementation that hands records to the registered [`Logger`].
struct ForwardingLogger;

impl log::Log for ForwardingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_record_from_secretkit = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("secretkit"));

        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Debug and trace from dependencies are noise for the host.
        if is_debug_or_trace_level && !is_record_from_secretkit {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

const fn level_filter(level: LogLevel) -> log::LevelFilter {
    match level {
        LogLevel::Error => log::LevelFilter::Error,
        LogLevel::Warn => log::LevelFilter::Warn,
        LogLevel::Info => log::LevelFilter::Info,
        LogLevel::Debug => log::LevelFilter::Debug,
        LogLevel::Trace => log::LevelFilter::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Only the first call takes effect; later calls are ignored with a notice on
/// stderr. Installs the `log` facade the first time it is called.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

/// Sets the least severe level that reaches the registered [`Logger`].
///
/// Records below `level` are dropped by the `log` macros before they are
/// formatted. May be called before or after [`set_logger`].
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level_filter(level));
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForwardingLogger = ForwardingLogger;
    log::set_logger(&LOGGER)?;
    // Keep a level chosen through `set_log_level` before the logger existed.
    if log::max_level() == log::LevelFilter::Off {
        log::set_max_level(log::LevelFilter::Trace);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CapturingLogger {
        records: Mutex<Vec<(LogLevel, String)>>,
    }

    impl Logger for CapturingLogger {
        fn log(&self, level: LogLevel, message: String) {
            self.records.lock().unwrap().push((level, message));
        }
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level(log::Level::Error), LogLevel::Error);
        assert_eq!(log_level(log::Level::Warn), LogLevel::Warn);
        assert_eq!(log_level(log::Level::Info), LogLevel::Info);
        assert_eq!(log_level(log::Level::Debug), LogLevel::Debug);
        assert_eq!(log_level(log::Level::Trace), LogLevel::Trace);
    }

    #[test]
    fn test_records_reach_registered_logger() {
        let capture = Arc::new(CapturingLogger::default());
        set_logger(capture.clone());

        log::warn!("secret store read failed");
        log::debug!("secretkit debug detail");

        set_log_level(LogLevel::Warn);
        log::info!("secretkit info below the level");
        set_log_level(LogLevel::Trace);

        let records = capture.records.lock().unwrap();
        assert!(records
            .iter()
            .any(|(level, msg)| *level == LogLevel::Warn && msg == "secret store read failed"));
        assert!(records
            .iter()
            .any(|(level, msg)| *level == LogLevel::Debug && msg == "secretkit debug detail"));
        assert!(records
            .iter()
            .all(|(_, msg)| msg != "secretkit info below the level"));
    }

    #[test]
    fn test_level_filter_mapping_and_names() {
        assert_eq!(level_filter(LogLevel::Warn), log::LevelFilter::Warn);
        assert_eq!(level_filter(LogLevel::Trace), log::LevelFilter::Trace);
        assert_eq!(
            serde_json::to_string(&LogLevel::Debug).unwrap(),
            "\"debug\""
        );
        assert_eq!(
            serde_json::from_str::<LogLevel>("\"error\"").unwrap(),
            LogLevel::Error
        );
    }
}
