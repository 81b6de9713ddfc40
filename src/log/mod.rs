//! Injected logging seam for scheduler components.
//!
//! Executors, queues and the coalescing dispatcher never talk to a logging
//! backend directly. Each component is handed an `Arc<dyn Logger>` at
//! construction and writes through it, so the embedding application decides
//! where (or whether) scheduler noise goes.
//!
//! - [`Logger`]: the interface components write to
//! - [`TracingLogger`]: production adapter delegating to the `tracing` crate
//! - [`NoOpLogger`]: the silent default, also handy in tests
//!
//! Subscriber setup (file output, filtering, formatting) belongs to the
//! application and happens once at startup; this crate only ever emits
//! through the injected handle.
//!
//! ```
//! use twostage::log::{Logger, NoOpLogger};
//! use twostage::log_debug;
//! use std::sync::Arc;
//!
//! struct Dispatcher {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! impl Dispatcher {
//!     fn submit(&self, key: &str) {
//!         log_debug!(self.logger, "submitting request key={}", key);
//!     }
//! }
//!
//! let dispatcher = Dispatcher { logger: Arc::new(NoOpLogger) };
//! dispatcher.submit("tile/9");
//! ```

mod noop;
mod tracing_adapter;
mod r#trait;

pub use noop::NoOpLogger;
pub use r#trait::{LogLevel, Logger};
pub use tracing_adapter::TracingLogger;
