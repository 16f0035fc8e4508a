//! Chronicle Core: aggregate persistence abstractions.
//!
//! This crate defines the normalization protocol, collections, the criteria
//! language and its in-process translator, the event and aggregate model,
//! and the storage contract every backend implements. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod collection;
pub mod criteria;
pub mod datetime;
pub mod error;
pub mod event;
pub mod expression;
pub mod identifier;
pub mod normalize;
pub mod repository;
pub mod storage;
pub mod translator;
pub mod value;

pub use aggregate::AggregateRoot;
pub use collection::{Collection, CollectionKind, Page};
pub use criteria::{Criteria, Direction};
pub use datetime::Datetime;
pub use error::DomainError;
pub use event::{Event, EventPayload, EventRecord};
pub use identifier::{Identifier, Identity};
pub use normalize::{Normalizable, Registry, TaggedMap};
pub use repository::Repository;
pub use storage::Storage;
