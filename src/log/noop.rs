//! No-operation logger implementation.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// A logger that discards every message.
///
/// The default for all scheduler components: a library should stay silent
/// unless the application opts in. Also keeps test output clean.
///
/// # Example
///
/// ```
/// use twostage::log::{Logger, NoOpLogger};
/// use std::sync::Arc;
///
/// let logger: Arc<dyn Logger> = Arc::new(NoOpLogger);
/// logger.info(format_args!("discarded"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline]
    fn log(&self, _level: LogLevel, _args: Arguments<'_>) {}
}
