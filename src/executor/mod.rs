//! Auxiliary Execution Framework
//!
//! This module provides the priority-scheduled worker pools the request
//! layer runs its two phases on. Each pool owns a queue of pending requests
//! and a set of on-demand workers that drain it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AuxiliaryExecutor                        │
//! │  Accept requests, spawn/wake workers, release identifiers   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐  ┌─────────────────────────────┐  │
//! │  │ PriorityQueue        │  │ Worker tasks                │  │
//! │  │ tiers of KeyedStack  │  │ pop → run → report → park   │  │
//! │  └──────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Prioritizable**: A unit of work with an [`Identifier`] and an async
//!   body. The pool never runs two requests with the same identifier at
//!   once.
//!
//! - **Priority**: Requests are scheduled by tier, and within a tier the
//!   most recent submission runs first. Re-submitting an identifier bumps
//!   its pending entry instead of duplicating it.
//!
//! - **Release**: A finished identifier stays blocked until the pool's
//!   owner calls [`AuxiliaryExecutor::notify_request_complete`], so result
//!   fan-out finishes before a repeat submission can run.
//!
//! [`Identifier`]: crate::identifier::Identifier

// Module declarations
mod config;
mod keyed_stack;
mod pool;
mod priority;
mod queue;
mod request;

// Re-export public types

// Configuration
pub use config::{
    PoolConfig, DEFAULT_KEEP_ALIVE, DEFAULT_NETWORK_POOL_SIZE, DEFAULT_PROCESSING_POOL_SIZE,
};

// Requests
pub use priority::Priority;
pub use request::{Prioritizable, PrioritizableRequest, RunOutcome};

// Queue
pub use keyed_stack::KeyedStack;
pub use queue::{Dequeue, PriorityAccessor, PriorityQueue};

// Pool
pub use pool::{AuxiliaryExecutor, ExecutorObserver, ExecutorStats};
