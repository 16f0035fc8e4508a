//! Chronicle Event Store: append-only, event-sourced storage.
//!
//! [`EventStore`] implements the `Storage` contract over any [`EventLog`]:
//! writes append an aggregate's pending events after an optimistic
//! concurrency check, reads replay each emitter's history. Two logs ship
//! here, [`MemoryEventLog`] and the `PostgreSQL`-backed [`PgEventLog`].

pub mod config;
pub mod log;
pub mod memory;
pub mod pg_event_log;
pub mod schema;
pub mod store;

pub use config::{ConfigError, EventStoreConfig};
pub use log::EventLog;
pub use memory::MemoryEventLog;
pub use pg_event_log::PgEventLog;
pub use store::EventStore;
