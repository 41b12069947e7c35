//! Entity model, local cache, offline queue and remote-store contract for
//! client portfolio synchronization.

pub mod entities;
pub mod errors;
pub mod legacy;
pub mod secrets;
pub mod storage;
pub mod sync;

pub use errors::{Error, Result};
