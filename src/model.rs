use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only stored time type. Civil time lives in `time::Clock`.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Intersection with `bound`, or `None` when they do not overlap.
    pub fn clip(&self, bound: &Span) -> Option<Span> {
        if !self.overlaps(bound) {
            return None;
        }
        Some(Span::new(self.start.max(bound.start), self.end.min(bound.end)))
    }
}

/// Room class. The occupancy rule for each class is data, see `engine::policy::OCCUPANCY_RULES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomClass {
    /// Single-person study room.
    A,
    /// Small group room.
    B,
    /// Large group room.
    C,
}

impl std::fmt::Display for RoomClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomClass::A => "A",
            RoomClass::B => "B",
            RoomClass::C => "C",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub class: RoomClass,
    /// Hard upper bound on headcount, checked alongside the class range.
    pub capacity: u32,
    pub status: RoomStatus,
}

/// Partial room update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub class: Option<RoomClass>,
    pub capacity: Option<u32>,
    pub status: Option<RoomStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    /// Terminal.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub room_id: Ulid,
    pub span: Span,
    pub occupancy: u32,
    pub status: ReservationStatus,
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Ulid,
    /// Unique login handle (an e-mail address in practice).
    pub external_id: String,
    pub name: String,
    /// Opaque to the engine; hashing and verification happen elsewhere.
    pub credential: String,
    pub role: String,
    /// Stored for a future policy; not enforced.
    pub credit_limit: i64,
}

/// Everything the engine knows about one room. Reservations of all statuses,
/// sorted by `span.start`; cancelled ones stay so cancellation stays idempotent.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    reservations: Vec<Reservation>,
    active_count: usize,
    /// Longest span ever inserted; bounds how far back an overlap can start.
    longest_ms: Ms,
    /// Set when the room is deleted while someone still holds its handle.
    pub deleted: bool,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
            active_count: 0,
            longest_ms: 0,
            deleted: false,
        }
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        if reservation.is_active() {
            self.active_count += 1;
        }
        self.longest_ms = self.longest_ms.max(reservation.span.duration_ms());
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        let removed = self.reservations.remove(pos);
        if removed.is_active() {
            self.active_count -= 1;
        }
        Some(removed)
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Mark a reservation cancelled. False if unknown or already cancelled.
    pub fn cancel_reservation(&mut self, id: Ulid) -> bool {
        match self.reservations.iter_mut().find(|r| r.id == id) {
            Some(r) if r.is_active() => {
                r.status = ReservationStatus::Cancelled;
                self.active_count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn has_active(&self) -> bool {
        self.active_count > 0
    }

    /// Active reservations whose span overlaps the query window.
    ///
    /// Only the start-sorted slice that could reach the window is scanned:
    /// nothing starting at or after `query.end`, and nothing starting so early
    /// that even the longest stored span ends by `query.start`.
    pub fn overlapping_active(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let earliest = query.start.saturating_sub(self.longest_ms);
        let left_bound = self
            .reservations
            .partition_point(|r| r.span.start < earliest);
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[left_bound..right_bound]
            .iter()
            .filter(move |r| r.is_active() && r.span.end > query.start)
    }
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        room: Room,
    },
    RoomDeleted {
        id: Ulid,
    },
    PrincipalRegistered {
        principal: Principal,
    },
    ReservationCommitted {
        reservation: Reservation,
    },
    ReservationAmended {
        id: Ulid,
        room_id: Ulid,
        span: Span,
    },
    ReservationCancelled {
        id: Ulid,
        room_id: Ulid,
    },
}

impl Event {
    /// The room an event belongs to, if any.
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Event::RoomCreated { room } | Event::RoomUpdated { room } => Some(room.id),
            Event::RoomDeleted { id } => Some(*id),
            Event::ReservationCommitted { reservation } => Some(reservation.room_id),
            Event::ReservationAmended { room_id, .. }
            | Event::ReservationCancelled { room_id, .. } => Some(*room_id),
            Event::PrincipalRegistered { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One `{start, end}` entry of an availability answer, as canonical-zone "HH:MM".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSlot {
    pub start: String,
    pub end: String,
}

impl ClockSlot {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Result of a cancellation: repeated cancellation is reported, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
}
