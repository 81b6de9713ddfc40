//! Tracing library adapter implementation.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Logger implementation that forwards to the `tracing` crate.
///
/// Bridges the injected [`Logger`] seam to the `tracing` ecosystem so the
/// application's subscriber (filtering, file output, formatting) applies to
/// scheduler messages too. The subscriber must be installed by the
/// application; this adapter only emits events.
///
/// # Example
///
/// ```ignore
/// use twostage::log::{Logger, TracingLogger};
/// use std::sync::Arc;
///
/// // Assumes a tracing subscriber is already installed.
/// let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
/// logger.info(format_args!("scheduler online"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Creates a new tracing logger adapter.
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        match level {
            LogLevel::Trace => tracing::trace!("{}", args),
            LogLevel::Debug => tracing::debug!("{}", args),
            LogLevel::Info => tracing::info!("{}", args),
            LogLevel::Warn => tracing::warn!("{}", args),
            LogLevel::Error => tracing::error!("{}", args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_logger_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TracingLogger>();
    }

    #[test]
    fn test_tracing_logger_as_trait_object() {
        // Without a subscriber these are dropped; the point is the dispatch.
        let logger: Box<dyn Logger> = Box::new(TracingLogger::new());
        logger.debug(format_args!("debug"));
        logger.error(format_args!("error"));
    }
}
