use chrono::NaiveTime;

use crate::model::*;
use crate::time::Clock;

use super::{EngineError, OccupancyBound, WindowViolation};

/// Booking window rules. Both operating-hour edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub max_duration_ms: Ms,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            closes_at: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            max_duration_ms: 4 * HOUR_MS,
        }
    }
}

impl WindowPolicy {
    fn within_hours(&self, t: NaiveTime) -> bool {
        self.opens_at <= t && t <= self.closes_at
    }
}

/// Check a normalized candidate window. Returns the first violated rule.
pub fn validate_window(
    clock: &Clock,
    policy: &WindowPolicy,
    start: Ms,
    end: Ms,
) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidWindow(WindowViolation::InvalidOrdering));
    }
    if end - start > policy.max_duration_ms {
        return Err(EngineError::InvalidWindow(WindowViolation::DurationExceeded {
            max_ms: policy.max_duration_ms,
        }));
    }
    let same_day = clock.civil_date(start) == clock.civil_date(end);
    if !same_day
        || !policy.within_hours(clock.time_of_day(start))
        || !policy.within_hours(clock.time_of_day(end))
    {
        return Err(EngineError::InvalidWindow(WindowViolation::OutsideOperatingHours {
            opens_at: policy.opens_at,
            closes_at: policy.closes_at,
        }));
    }
    Ok(Span::new(start, end))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyRange {
    pub min: u32,
    pub max: u32,
}

/// Allowed headcount per room class.
pub const OCCUPANCY_RULES: [(RoomClass, OccupancyRange); 3] = [
    (RoomClass::A, OccupancyRange { min: 1, max: 1 }),
    (RoomClass::B, OccupancyRange { min: 2, max: 5 }),
    (RoomClass::C, OccupancyRange { min: 6, max: 10 }),
];

pub fn occupancy_range(class: RoomClass) -> OccupancyRange {
    OCCUPANCY_RULES
        .iter()
        .find(|(c, _)| *c == class)
        .map(|(_, range)| *range)
        .unwrap_or(OccupancyRange { min: 1, max: 1 })
}

/// Check a headcount against the room's class range and its capacity.
pub fn validate_occupancy(room: &Room, count: i64) -> Result<u32, EngineError> {
    let reject = |bound| EngineError::OccupancyOutOfRange {
        class: room.class,
        count,
        bound,
    };
    if count <= 0 {
        return Err(reject(OccupancyBound::NonPositive));
    }
    let range = occupancy_range(room.class);
    if count < i64::from(range.min) {
        return Err(reject(OccupancyBound::Minimum(range.min)));
    }
    if count > i64::from(range.max) {
        return Err(reject(OccupancyBound::Maximum(range.max)));
    }
    if count > i64::from(room.capacity) {
        return Err(reject(OccupancyBound::Capacity(room.capacity)));
    }
    // count <= range.max, which is a u32
    Ok(count as u32)
}
