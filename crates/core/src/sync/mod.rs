//! Sync domain models and services.

mod cache;
mod queue;
mod remote;
mod sync_engine;
mod sync_model;
mod sync_scheduler;

pub use cache::*;
pub use queue::*;
pub use remote::*;
pub use sync_engine::*;
pub use sync_model::*;
pub use sync_scheduler::*;
