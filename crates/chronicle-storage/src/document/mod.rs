//! Document-store query vocabulary: the translator producing filter
//! documents and the store contract consuming them.

pub mod store;
pub mod translator;

pub use store::{DocumentStore, MemoryDocumentStore};
pub use translator::{Document, DocumentTranslator, FindOptions, Slicing};
