use std::sync::{Arc, OnceLock};

/// Receives log messages emitted by the orchestrator.
///
/// Library code logs through `tracing`; records reach this trait through the
/// `log` facade, so a host that never installs a `tracing` subscriber still
/// sees them.
///
/// ## Swift
///
/// ```swift
/// class WalletFlowLoggerBridge: WalletFlow.Logger {
///     static let shared = WalletFlowLoggerBridge()
///
///     func log(level: WalletFlow.LogLevel, message: String) {
///         Log.log(level.toCoreLevel(), message)
///     }
/// }
///
/// WalletFlow.setLogger(logger: WalletFlowLoggerBridge.shared) // once
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging information.
    Debug,
    /// Workflow progress.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
}

/// Forwards `log` records to the foreign [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
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

/// Debug and trace records from dependencies are dropped; everything from
/// `walletflow` modules and every record at info or above is kept.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let is_debug_or_trace = level == log::Level::Debug || level == log::Level::Trace;
    let from_walletflow = module_path.is_some_and(|path| path.starts_with("walletflow"));
    !is_debug_or_trace || from_walletflow
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

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger. Only the first call has an effect.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_debug_records_are_dropped() {
        assert!(!should_forward(log::Level::Debug, Some("tokio::runtime")));
        assert!(!should_forward(log::Level::Trace, None));
        assert!(should_forward(
            log::Level::Debug,
            Some("walletflow_core::engine")
        ));
        assert!(should_forward(log::Level::Warn, Some("tokio::runtime")));
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(log_level(log::Level::Error), LogLevel::Error);
        assert_eq!(log_level(log::Level::Trace), LogLevel::Trace);
    }
}
