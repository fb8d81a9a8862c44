use chrono::NaiveTime;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{Ms, RoomClass};

/// Why a candidate `[start, end)` was rejected, in the order the rules are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowViolation {
    #[error("local time does not exist in the canonical zone")]
    NonexistentLocalTime,
    #[error("invalid ordering: start must be before end")]
    InvalidOrdering,
    #[error("duration exceeded: at most {max_ms} ms")]
    DurationExceeded { max_ms: Ms },
    #[error("outside operating hours {opens_at}-{closes_at}")]
    OutsideOperatingHours {
        opens_at: NaiveTime,
        closes_at: NaiveTime,
    },
}

/// The occupancy bound a headcount violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OccupancyBound {
    #[error("must be greater than 0")]
    NonPositive,
    #[error("minimum {0}")]
    Minimum(u32),
    #[error("maximum {0}")]
    Maximum(u32),
    #[error("room capacity {0}")]
    Capacity(u32),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid window: {0}")]
    InvalidWindow(WindowViolation),
    #[error("occupancy {count} out of range for class {class}: {bound}")]
    OccupancyOutOfRange {
        class: RoomClass,
        count: i64,
        bound: OccupancyBound,
    },
    #[error("room not found: {0}")]
    RoomNotFound(Ulid),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("reservation {reservation} is not owned by {requester}")]
    NotOwner { reservation: Ulid, requester: Ulid },
    #[error("reservation {0} is not active")]
    NotActive(Ulid),
    #[error("room {0} is under maintenance")]
    RoomUnavailable(Ulid),
    #[error("conflict with reservation: {0}")]
    Conflict(Ulid),
    #[error("room {0} is busy, retry later")]
    RetryLater(Ulid),
    #[error("room name already taken: {0}")]
    DuplicateName(String),
    #[error("external id already registered: {0}")]
    DuplicateExternalId(String),
    #[error("room {0} still has active reservations")]
    HasActiveReservations(Ulid),
    #[error("invalid room: {0}")]
    InvalidRoom(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Storage failure. The detail is logged where it happens and never shown.
    #[error("internal error")]
    Internal(String),
}

impl EngineError {
    /// Only transient contention is safe to retry verbatim. A conflict is a fact.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::RetryLater(_))
    }
}
