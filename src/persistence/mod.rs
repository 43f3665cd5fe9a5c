//! Durable diagnostic state
//!
//! Only the pre-restart record lives here; application records are owned by
//! the marketplace layer.

pub mod restart_record;
pub mod store;

pub use restart_record::RestartRecord;
pub use store::{JsonFileStore, PersistenceError, PersistenceResult, StateStore};
