//! Pre-allocated worker reservoir with background slab replenishment.
//!
//! A [`Fount`] holds a small pool of ready-to-use workers (the "fount") on
//! top of a stack of pre-built reserve slabs, refilled in the background by
//! one allocator thread per slab so that [`Fount::get_many`] and
//! [`Fount::task_pids`] never block on worker construction.

mod allocator;
mod config;
mod core;
mod dispatch;
mod error;
mod facade;
mod factory;
mod slab;
mod state;
mod status;

pub use config::FountConfig;
pub use dispatch::DispatchOutcome;
pub use error::{DeliverError, FountError};
pub use facade::Fount;
pub use factory::{CoreRef, WorkerFactory};
pub use state::State;
pub use status::Status;
