use crate::collision::CollisionKind;
use crate::particle::Particle;

/// What happened to a particle worth recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// A collision on a channel flagged for recording.
    Collision(CollisionKind),
    /// The particle left the domain; carries the outside-check reason code.
    WentOut(i32),
}

/// One recorded event: the incident particle as it was at the moment of the
/// event, before any kernel transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub part: Particle,
    /// Channel index into the engine's collision table; 0 for `WentOut`.
    pub coll_index: usize,
    pub kind: EventKind,
}

/// Growable event sequence. Storage grows geometrically on overflow; during
/// a parallel advance all appends happen inside the bookkeeping lock.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn n_stored(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }
}
