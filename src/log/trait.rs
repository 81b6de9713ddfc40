//! Logger trait definition.

use std::fmt::Arguments;

/// Severity level attached to every log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Very fine-grained scheduler internals
    Trace,
    /// Worker and queue lifecycle events
    Debug,
    /// Notable state changes
    Info,
    /// Recoverable anomalies
    Warn,
    /// Captured failures
    Error,
}

/// Logging interface injected into scheduler components.
///
/// Implementations must be `Send + Sync`; the same logger handle is shared
/// by worker loops, submission threads and observer callbacks.
///
/// # Example
///
/// ```
/// use twostage::log::{Logger, NoOpLogger};
/// use twostage::{log_info, log_warn};
/// use std::sync::Arc;
///
/// let logger: Arc<dyn Logger> = Arc::new(NoOpLogger);
/// log_info!(logger, "pool started");
/// log_warn!(logger, "queue depth {}", 12);
/// ```
pub trait Logger: Send + Sync {
    /// Writes a message at the given level.
    ///
    /// The single required method; the leveled convenience methods all
    /// delegate here.
    fn log(&self, level: LogLevel, args: Arguments<'_>);

    /// Writes a trace-level message.
    fn trace(&self, args: Arguments<'_>) {
        self.log(LogLevel::Trace, args);
    }

    /// Writes a debug-level message.
    fn debug(&self, args: Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    /// Writes an info-level message.
    fn info(&self, args: Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    /// Writes a warning.
    fn warn(&self, args: Arguments<'_>) {
        self.log(LogLevel::Warn, args);
    }

    /// Writes an error.
    fn error(&self, args: Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }
}

#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($arg:tt)*) => {
        $logger.trace(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_level_equality() {
        assert_eq!(LogLevel::Debug, LogLevel::Debug);
        assert_ne!(LogLevel::Debug, LogLevel::Error);
    }
}
