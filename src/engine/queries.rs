use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::{busy_spans, open_spans};
use super::{Engine, EngineError};

impl Engine {
    pub fn get_room(&self, id: &Ulid) -> Option<Room> {
        let handle = self.store.get_room(id)?;
        let state = handle.state.read();
        Some(state.room.clone())
    }

    pub fn find_room(&self, name: &str) -> Option<Room> {
        let id = self.store.room_by_name(name)?;
        self.get_room(&id)
    }

    /// All rooms, optionally of one class, ordered by id.
    pub fn list_rooms(&self, class: Option<RoomClass>) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .store
            .rooms()
            .into_iter()
            .map(|h| h.state.read().room.clone())
            .filter(|r| class.is_none_or(|c| r.class == c))
            .collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        let room_id = self.store.room_for_reservation(&id)?;
        let handle = self.store.get_room(&room_id)?;
        let state = handle.state.read();
        state.reservation(id).cloned()
    }

    /// Every reservation of an owner, any status, latest start first.
    pub fn list_owner_reservations(&self, owner_id: &Ulid) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .store
            .owner_reservation_ids(owner_id)
            .into_iter()
            .filter_map(|id| self.get_reservation(id))
            .collect();
        out.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(b.id.cmp(&a.id)));
        out
    }

    /// Reservations of a room, any status, ordered by start.
    pub fn list_room_reservations(&self, room_id: &Ulid) -> Result<Vec<Reservation>, EngineError> {
        let handle = self
            .store
            .get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        let state = handle.state.read();
        Ok(state.reservations().to_vec())
    }

    /// Busy intervals of a room on a civil date, as canonical-zone "HH:MM".
    ///
    /// Reads a consistent snapshot of the room without waiting on in-flight
    /// commits. Adjacent reservations stay separate entries.
    pub fn query_availability(&self, room_id: &Ulid, date: NaiveDate) -> Result<Vec<ClockSlot>, EngineError> {
        let handle = self
            .store
            .get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        let day = self.clock.day_span(date);
        let busy = {
            let state = handle.state.read();
            busy_spans(&state, &day)
        };
        Ok(busy
            .iter()
            .map(|s| {
                ClockSlot::new(
                    self.clock.clock_string(s.start, &day),
                    self.clock.clock_string(s.end, &day),
                )
            })
            .collect())
    }

    /// Free bookable spans of a room on a civil date, inside operating hours.
    pub fn query_open_slots(
        &self,
        room_id: &Ulid,
        date: NaiveDate,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        let handle = self
            .store
            .get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        let opens = self.clock.at(date, self.window.opens_at)?;
        let closes = self.clock.at(date, self.window.closes_at)?;
        if opens >= closes {
            return Ok(Vec::new());
        }
        let hours = Span::new(opens, closes);
        let busy = {
            let state = handle.state.read();
            busy_spans(&state, &hours)
        };
        Ok(open_spans(&hours, &busy, min_duration_ms))
    }

    pub fn get_principal(&self, id: &Ulid) -> Option<Principal> {
        self.store.get_principal(id)
    }

    pub fn find_principal(&self, external_id: &str) -> Option<Principal> {
        self.store.find_principal(external_id)
    }

    pub fn room_count(&self) -> usize {
        self.store.room_count()
    }
}
