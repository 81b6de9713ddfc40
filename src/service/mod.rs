//! Request scheduling layer: phases, observers and the coalescing executor.
//!
//! This module is the seam between task-shaped work and the worker pools.
//! Work arrives as a [`NetworkingPrioritizable`] or
//! [`ProcessingPrioritizable`], is dispatched through a [`RequestHandler`],
//! and reports back through the phase observer traits.
//!
//! # Example
//!
//! ```ignore
//! use twostage::service::{
//!     phase_data, NetworkingPrioritizable, RequestExecutor, RequestHandler,
//! };
//! use twostage::executor::{Priority, PrioritizableRequest};
//! use twostage::Identifier;
//!
//! let executor = RequestExecutor::new();
//! let work = NetworkingPrioritizable::new(
//!     Identifier::from("record/42"),
//!     observer,
//!     || async { Ok(phase_data(fetch_record(42).await?)) },
//! );
//! executor.execute_networking_request(PrioritizableRequest::new(work, Priority::Normal));
//! ```

mod error;
mod handler;
mod identifier_map;
mod phases;
mod request_executor;

pub use error::ServiceError;
pub use handler::{RequestHandler, SerialRequestExecutor};
pub use identifier_map::IdentifierMap;
pub use phases::{
    phase_data, NetworkingObserver, NetworkingPrioritizable, NetworkingRequest, PhaseData,
    ProcessingObserver, ProcessingPrioritizable, ProcessingRequest,
};
pub use request_executor::{CoalescingStats, RequestExecutor, RequestExecutorConfig};
