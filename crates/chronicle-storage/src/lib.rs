//! Chronicle Storage: state-based backends for the `Storage` contract.
//!
//! [`InMemoryStorage`] keeps normalized aggregates in process and filters
//! them with the in-process translator. [`ReadSide`] materializes aggregates
//! as documents in a [`DocumentStore`] and queries them through filter
//! documents.

pub mod document;
pub mod memory;
pub mod read_side;

pub use document::{DocumentStore, DocumentTranslator, FindOptions, MemoryDocumentStore};
pub use memory::InMemoryStorage;
pub use read_side::ReadSide;
