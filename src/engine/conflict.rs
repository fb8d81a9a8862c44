use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// First active reservation in `rs` overlapping `span`, ignoring `exclude`
/// (the reservation being amended).
pub fn find_conflict<'a>(
    rs: &'a RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    rs.overlapping_active(span)
        .find(|r| Some(r.id) != exclude && r.span.overlaps(span))
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(rs, span, exclude) {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
