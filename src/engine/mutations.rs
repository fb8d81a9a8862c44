use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::time::{Clock, TimeInput};

use super::conflict::check_no_conflict;
use super::policy::{occupancy_range, validate_occupancy, validate_window};
use super::{Engine, EngineError, RoomCommit, WalCommand};

fn ensure_available(room: &Room) -> Result<(), EngineError> {
    match room.status {
        RoomStatus::Available => Ok(()),
        RoomStatus::Maintenance => Err(EngineError::RoomUnavailable(room.id)),
    }
}

fn validate_room_fields(name: &str, class: RoomClass, capacity: u32) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidRoom("name must not be empty"));
    }
    if name.len() > MAX_ROOM_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if capacity == 0 {
        return Err(EngineError::InvalidRoom("capacity must be greater than 0"));
    }
    if capacity > MAX_ROOM_CAPACITY {
        return Err(EngineError::LimitExceeded("room capacity too large"));
    }
    if capacity < occupancy_range(class).min {
        return Err(EngineError::InvalidRoom("capacity below the class minimum"));
    }
    Ok(())
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(
        &self,
        name: String,
        class: RoomClass,
        capacity: u32,
        status: RoomStatus,
    ) -> Result<Room, EngineError> {
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        validate_room_fields(&name, class, capacity)?;

        let room = Room {
            id: Ulid::new(),
            name,
            class,
            capacity,
            status,
        };
        if !self.store.claim_name(&room.name, room.id) {
            return Err(EngineError::DuplicateName(room.name));
        }

        let event = Event::RoomCreated { room: room.clone() };
        if let Err(e) = self
            .persist_with(&event, || {
                self.store.insert_room(room.clone());
            })
            .await
        {
            self.store.release_name(&room.name, &room.id);
            return Err(e);
        }
        self.notify.send(room.id, &event);
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.store.room_count() as f64);
        tracing::info!(room_id = %room.id, name = %room.name, class = %room.class, "room created");
        Ok(room)
    }

    pub async fn update_room(&self, id: Ulid, patch: RoomPatch) -> Result<Room, EngineError> {
        let commit = self.lock_room(id).await?;
        let current = commit.room.state.read().room.clone();

        let updated = Room {
            id,
            name: patch.name.unwrap_or_else(|| current.name.clone()),
            class: patch.class.unwrap_or(current.class),
            capacity: patch.capacity.unwrap_or(current.capacity),
            status: patch.status.unwrap_or(current.status),
        };
        validate_room_fields(&updated.name, updated.class, updated.capacity)?;
        if updated == current {
            return Ok(current);
        }

        let renamed = updated.name != current.name;
        if renamed && !self.store.claim_name(&updated.name, id) {
            return Err(EngineError::DuplicateName(updated.name));
        }

        let event = Event::RoomUpdated { room: updated.clone() };
        if let Err(e) = self.persist_and_apply(&commit, &event).await {
            if renamed {
                self.store.release_name(&updated.name, &id);
            }
            return Err(e);
        }
        tracing::info!(room_id = %id, "room updated");
        Ok(updated)
    }

    /// Delete a room. Refused while any active reservation references it.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let commit = self.lock_room(id).await?;
        if commit.room.state.read().has_active() {
            return Err(EngineError::HasActiveReservations(id));
        }

        let event = Event::RoomDeleted { id };
        self.persist_with(&event, || self.store.remove_room(&id)).await?;
        drop(commit);

        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.store.room_count() as f64);
        tracing::info!(room_id = %id, "room deleted");
        Ok(())
    }

    // ── Principals ───────────────────────────────────────────

    pub async fn register_principal(
        &self,
        external_id: String,
        name: String,
        credential: String,
        role: String,
        credit_limit: i64,
    ) -> Result<Principal, EngineError> {
        if self.store.principal_count() >= MAX_PRINCIPALS {
            return Err(EngineError::LimitExceeded("too many principals"));
        }
        if external_id.is_empty() || external_id.len() > MAX_EXTERNAL_ID_LEN {
            return Err(EngineError::LimitExceeded("external id length"));
        }
        if name.len() > MAX_PRINCIPAL_NAME_LEN {
            return Err(EngineError::LimitExceeded("principal name too long"));
        }
        if role.len() > MAX_ROLE_LEN {
            return Err(EngineError::LimitExceeded("role too long"));
        }

        let principal = Principal {
            id: Ulid::new(),
            external_id,
            name,
            credential,
            role,
            credit_limit,
        };
        if !self.store.claim_external_id(&principal.external_id, principal.id) {
            return Err(EngineError::DuplicateExternalId(principal.external_id));
        }

        let event = Event::PrincipalRegistered {
            principal: principal.clone(),
        };
        if let Err(e) = self
            .persist_with(&event, || self.store.insert_principal(principal.clone()))
            .await
        {
            self.store
                .release_external_id(&principal.external_id, &principal.id);
            return Err(e);
        }
        tracing::info!(principal_id = %principal.id, "principal registered");
        Ok(principal)
    }

    // ── Reservations ─────────────────────────────────────────

    /// Normalize, validate, then commit a new reservation under the room's
    /// exclusion. Never double-books: the conflict check and the write happen
    /// while no other commit on this room can run.
    pub async fn create_reservation(
        &self,
        room_id: Ulid,
        owner_id: Ulid,
        start: impl Into<TimeInput>,
        end: impl Into<TimeInput>,
        occupancy: i64,
    ) -> Result<Reservation, EngineError> {
        let result = self
            .try_create_reservation(room_id, owner_id, start.into(), end.into(), occupancy)
            .await;
        observability::record_op("create", &result);
        result
    }

    async fn try_create_reservation(
        &self,
        room_id: Ulid,
        owner_id: Ulid,
        start: TimeInput,
        end: TimeInput,
        occupancy: i64,
    ) -> Result<Reservation, EngineError> {
        // Pure checks first; no lock needed.
        let start = self.clock.to_ms(start)?;
        let end = self.clock.to_ms(end)?;
        let span = validate_window(&self.clock, &self.window, start, end)?;

        let handle = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let snapshot = handle.state.read().room.clone();
        validate_occupancy(&snapshot, occupancy)?;
        ensure_available(&snapshot)?;

        let commit = self.lock_room(room_id).await?;
        let reservation = {
            let state = commit.room.state.read();
            // The room record can change while we wait for the lock.
            let headcount = validate_occupancy(&state.room, occupancy)?;
            ensure_available(&state.room)?;
            if state.active_count() >= self.max_active_reservations {
                return Err(EngineError::LimitExceeded("too many active reservations on room"));
            }
            check_no_conflict(&state, &span, None)?;
            Reservation {
                id: Ulid::new(),
                owner_id,
                room_id,
                span,
                occupancy: headcount,
                status: ReservationStatus::Active,
                created_at: Clock::now_ms(),
            }
        };

        let event = Event::ReservationCommitted {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&commit, &event).await?;
        tracing::debug!(
            reservation_id = %reservation.id,
            %room_id,
            %owner_id,
            start = span.start,
            end = span.end,
            "reservation committed"
        );
        Ok(reservation)
    }

    /// Move an active reservation. Omitted bounds keep their current value;
    /// the new window is re-validated and conflict-checked against every other
    /// active reservation of the room.
    pub async fn amend_reservation(
        &self,
        id: Ulid,
        requester: Ulid,
        new_start: Option<TimeInput>,
        new_end: Option<TimeInput>,
    ) -> Result<Reservation, EngineError> {
        let result = self.try_amend_reservation(id, requester, new_start, new_end).await;
        observability::record_op("amend", &result);
        result
    }

    async fn try_amend_reservation(
        &self,
        id: Ulid,
        requester: Ulid,
        new_start: Option<TimeInput>,
        new_end: Option<TimeInput>,
    ) -> Result<Reservation, EngineError> {
        let new_start = new_start.map(|t| self.clock.to_ms(t)).transpose()?;
        let new_end = new_end.map(|t| self.clock.to_ms(t)).transpose()?;

        // Fail fast against a snapshot before queueing for the room.
        let snapshot = self.get_reservation(id).ok_or(EngineError::NotFound(id))?;
        self.prepare_amend(&snapshot, requester, new_start, new_end)?;

        let commit = self.lock_reservation_room(id).await?;
        let (current, span) = {
            let state = commit.room.state.read();
            let current = state.reservation(id).ok_or(EngineError::NotFound(id))?;
            let span = self.prepare_amend(current, requester, new_start, new_end)?;
            if span != current.span {
                check_no_conflict(&state, &span, Some(id))?;
            }
            (current.clone(), span)
        };
        if span == current.span {
            return Ok(current);
        }

        let event = Event::ReservationAmended {
            id,
            room_id: commit.room_id,
            span,
        };
        self.persist_and_apply(&commit, &event).await?;
        tracing::debug!(reservation_id = %id, start = span.start, end = span.end, "reservation amended");
        Ok(Reservation { span, ..current })
    }

    fn prepare_amend(
        &self,
        current: &Reservation,
        requester: Ulid,
        new_start: Option<Ms>,
        new_end: Option<Ms>,
    ) -> Result<Span, EngineError> {
        if current.owner_id != requester {
            return Err(EngineError::NotOwner {
                reservation: current.id,
                requester,
            });
        }
        if !current.is_active() {
            return Err(EngineError::NotActive(current.id));
        }
        let start = new_start.unwrap_or(current.span.start);
        let end = new_end.unwrap_or(current.span.end);
        validate_window(&self.clock, &self.window, start, end)
    }

    /// Cancel a reservation. Cancelling an already-cancelled reservation is a
    /// no-op reported as `AlreadyCancelled`; an unknown id is `NotFound`.
    pub async fn cancel_reservation(&self, id: Ulid, requester: Ulid) -> Result<CancelOutcome, EngineError> {
        let result = self.try_cancel_reservation(id, requester).await;
        observability::record_op("cancel", &result);
        result
    }

    async fn try_cancel_reservation(&self, id: Ulid, requester: Ulid) -> Result<CancelOutcome, EngineError> {
        let commit = self.lock_reservation_room(id).await?;
        {
            let state = commit.room.state.read();
            let current = state.reservation(id).ok_or(EngineError::NotFound(id))?;
            if current.owner_id != requester {
                return Err(EngineError::NotOwner {
                    reservation: id,
                    requester,
                });
            }
            if !current.is_active() {
                return Ok(CancelOutcome::AlreadyCancelled);
            }
        }

        let event = Event::ReservationCancelled {
            id,
            room_id: commit.room_id,
        };
        self.persist_and_apply(&commit, &event).await?;
        tracing::debug!(reservation_id = %id, "reservation cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// WAL-append then run `apply`, holding the compaction barrier in shared
    /// mode so a concurrent compaction cannot drop this event.
    pub(super) async fn persist_with(&self, event: &Event, apply: impl FnOnce()) -> Result<(), EngineError> {
        let _barrier = self.wal_barrier.read().await;
        self.wal_append(event).await?;
        apply();
        Ok(())
    }

    /// WAL-append + apply to the locked room + notify.
    pub(super) async fn persist_and_apply(&self, commit: &RoomCommit, event: &Event) -> Result<(), EngineError> {
        self.persist_with(event, || {
            let mut state = commit.room.state.write();
            self.store.apply_event(&mut state, event);
        })
        .await?;
        self.notify.send(commit.room_id, event);
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive barrier: no append can land between the snapshot and the swap.
        let _barrier = self.wal_barrier.write().await;

        let mut events: Vec<Event> = self
            .store
            .principals()
            .into_iter()
            .map(|principal| Event::PrincipalRegistered { principal })
            .collect();
        for handle in self.store.rooms() {
            let state = handle.state.read();
            if state.deleted {
                continue;
            }
            events.push(Event::RoomCreated {
                room: state.room.clone(),
            });
            events.extend(state.reservations().iter().map(|r| Event::ReservationCommitted {
                reservation: r.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| super::internal("WAL writer shut down"))?;
        rx.await
            .map_err(|_| super::internal("WAL writer dropped response"))?
            .map_err(|e| super::internal(format!("WAL compaction failed: {e}")))?;
        tracing::info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
