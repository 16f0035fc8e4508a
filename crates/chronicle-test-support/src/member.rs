//! Sample event-sourced aggregate used across the test suites.

use std::sync::LazyLock;

use chronicle_core::aggregate::AggregateRoot;
use chronicle_core::clock::Clock;
use chronicle_core::error::DomainError;
use chronicle_core::event::{Event, EventPayload};
use chronicle_core::identifier::{Identifier, Identity};
use chronicle_core::normalizable;
use chronicle_core::normalize::{Normalizable, Registry, TaggedMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GeoJSON point.
///
/// Its `type` key is the GeoJSON geometry kind, not a discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    kind: PointKind,
    coordinates: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum PointKind {
    Point,
}

impl GeoPoint {
    /// Creates a point from planar coordinates.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            kind: PointKind::Point,
            coordinates: [x, y],
        }
    }
}

/// Nested value object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Home city.
    pub city: String,
}

/// A member registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRegistered {
    /// Display name.
    pub name: String,
    /// Home city.
    pub city: String,
}

/// Points were awarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAwarded {
    /// Points added to the score.
    pub points: i64,
}

/// The membership status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged {
    /// New status.
    pub status: String,
}

/// The member moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relocated {
    /// New home city.
    pub city: String,
    /// New position.
    pub location: GeoPoint,
}

/// A tag was attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagged {
    /// The tag.
    pub tag: String,
}

normalizable!(MemberRegistered, "member_registered");
normalizable!(ScoreAwarded, "score_awarded");
normalizable!(StatusChanged, "status_changed");
normalizable!(Relocated, "relocated");
normalizable!(Tagged, "tagged");

/// Events raised by [`Member`].
#[derive(Debug, Clone, PartialEq)]
pub enum MemberEvent {
    /// See [`MemberRegistered`].
    Registered(MemberRegistered),
    /// See [`ScoreAwarded`].
    ScoreAwarded(ScoreAwarded),
    /// See [`StatusChanged`].
    StatusChanged(StatusChanged),
    /// See [`Relocated`].
    Relocated(Relocated),
    /// See [`Tagged`].
    Tagged(Tagged),
}

static MEMBER_EVENTS: LazyLock<Registry<MemberEvent>> = LazyLock::new(|| {
    Registry::new()
        .register(MemberEvent::Registered)
        .register(MemberEvent::ScoreAwarded)
        .register(MemberEvent::StatusChanged)
        .register(MemberEvent::Relocated)
        .register(MemberEvent::Tagged)
});

impl Normalizable for MemberEvent {
    const TYPE_NAME: &'static str = "member_event";

    fn normalize(&self) -> TaggedMap {
        match self {
            Self::Registered(e) => e.normalize(),
            Self::ScoreAwarded(e) => e.normalize(),
            Self::StatusChanged(e) => e.normalize(),
            Self::Relocated(e) => e.normalize(),
            Self::Tagged(e) => e.normalize(),
        }
    }

    fn denormalize(data: &TaggedMap) -> Result<Self, DomainError> {
        MEMBER_EVENTS.denormalize(data)
    }

    fn is_denormalizable(value: &Value) -> bool {
        MEMBER_EVENTS.is_denormalizable(value)
    }
}

impl EventPayload for MemberEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Registered(_) => MemberRegistered::TYPE_NAME,
            Self::ScoreAwarded(_) => ScoreAwarded::TYPE_NAME,
            Self::StatusChanged(_) => StatusChanged::TYPE_NAME,
            Self::Relocated(_) => Relocated::TYPE_NAME,
            Self::Tagged(_) => Tagged::TYPE_NAME,
        }
    }
}

/// Sample aggregate: a club member with a score, a status, a nested
/// profile, tags and a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    id: Identity,
    name: String,
    status: String,
    score: i64,
    profile: Profile,
    tags: Vec<String>,
    location: Option<GeoPoint>,
    #[serde(skip)]
    pending: Vec<Event<MemberEvent>>,
}

normalizable!(Member, "member");

impl Member {
    /// Registers a new member with status `active`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `name` is empty.
    pub fn register(name: &str, city: &str, clock: &dyn Clock) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::Validation("member name must not be empty".into()));
        }
        let mut member = Self::new_empty_for_replay();
        member.raise(
            MemberEvent::Registered(MemberRegistered {
                name: name.to_owned(),
                city: city.to_owned(),
            }),
            clock,
        )?;
        Ok(member)
    }

    /// Adds points to the score.
    ///
    /// # Errors
    ///
    /// Propagates event raising errors.
    pub fn award(&mut self, points: i64, clock: &dyn Clock) -> Result<(), DomainError> {
        self.raise(MemberEvent::ScoreAwarded(ScoreAwarded { points }), clock)
    }

    /// Changes the status.
    ///
    /// # Errors
    ///
    /// Propagates event raising errors.
    pub fn change_status(&mut self, status: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.raise(
            MemberEvent::StatusChanged(StatusChanged {
                status: status.to_owned(),
            }),
            clock,
        )
    }

    /// Moves the member.
    ///
    /// # Errors
    ///
    /// Propagates event raising errors.
    pub fn relocate(&mut self, city: &str, location: GeoPoint, clock: &dyn Clock) -> Result<(), DomainError> {
        self.raise(
            MemberEvent::Relocated(Relocated {
                city: city.to_owned(),
                location,
            }),
            clock,
        )
    }

    /// Attaches a tag.
    ///
    /// # Errors
    ///
    /// Propagates event raising errors.
    pub fn tag(&mut self, tag: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.raise(MemberEvent::Tagged(Tagged { tag: tag.to_owned() }), clock)
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns the score.
    #[must_use]
    pub fn score(&self) -> i64 {
        self.score
    }

    /// Returns the home city.
    #[must_use]
    pub fn city(&self) -> &str {
        &self.profile.city
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the position, if known.
    #[must_use]
    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }
}

impl AggregateRoot for Member {
    type Event = MemberEvent;

    fn identity(&self) -> &Identity {
        &self.id
    }

    fn new_empty_for_replay() -> Self {
        Self {
            id: Identity::new(),
            name: String::new(),
            status: String::new(),
            score: 0,
            profile: Profile::default(),
            tags: Vec::new(),
            location: None,
            pending: Vec::new(),
        }
    }

    fn apply(&mut self, event: &Event<MemberEvent>) {
        match event.payload() {
            MemberEvent::Registered(e) => {
                e.name.clone_into(&mut self.name);
                e.city.clone_into(&mut self.profile.city);
                "active".clone_into(&mut self.status);
            }
            MemberEvent::ScoreAwarded(e) => self.score += e.points,
            MemberEvent::StatusChanged(e) => e.status.clone_into(&mut self.status),
            MemberEvent::Relocated(e) => {
                e.city.clone_into(&mut self.profile.city);
                self.location = Some(e.location);
            }
            MemberEvent::Tagged(e) => self.tags.push(e.tag.clone()),
        }
    }

    fn pending_events(&self) -> &[Event<MemberEvent>] {
        &self.pending
    }

    fn pending_events_mut(&mut self) -> &mut Vec<Event<MemberEvent>> {
        &mut self.pending
    }
}

/// Builds a member with the given score and status, with every event
/// stamped by `clock`.
///
/// # Errors
///
/// Propagates [`Member::register`] errors.
pub fn member(
    name: &str,
    city: &str,
    status: &str,
    score: i64,
    clock: &dyn Clock,
) -> Result<Member, DomainError> {
    let mut member = Member::register(name, city, clock)?;
    if score != 0 {
        member.award(score, clock)?;
    }
    if status != "active" {
        member.change_status(status, clock)?;
    }
    Ok(member)
}

/// Returns the identifiers of `members`, in order.
pub fn ids<'a>(members: impl IntoIterator<Item = &'a Member>) -> Vec<Identifier> {
    members.into_iter().map(|m| m.id()).collect()
}
