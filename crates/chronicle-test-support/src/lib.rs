//! Shared test fixtures and doubles for the Chronicle persistence engine.

mod clock;
mod member;
mod storage;

pub use clock::{EPOCH_SECONDS, FixedClock, SteppingClock};
pub use member::{
    GeoPoint, Member, MemberEvent, MemberRegistered, Profile, Relocated, ScoreAwarded, StatusChanged,
    Tagged, ids, member,
};
pub use storage::{FailingStorage, RecordingStorage, StorageCall};
