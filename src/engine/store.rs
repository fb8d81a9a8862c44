use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::model::*;

/// One room: a commit mutex that serializes the read-check-write protocol, and
/// the room's data behind a lock that is only ever held for in-memory work.
pub struct RoomHandle {
    pub(crate) commit: Arc<Mutex<()>>,
    pub state: RwLock<RoomState>,
}

impl RoomHandle {
    pub fn new(room: Room) -> Self {
        Self {
            commit: Arc::new(Mutex::new(())),
            state: RwLock::new(RoomState::new(room)),
        }
    }
}

pub type SharedRoom = Arc<RoomHandle>;

pub struct InMemoryStore {
    rooms: DashMap<Ulid, SharedRoom>,
    room_names: DashMap<String, Ulid>,
    /// Reverse lookup: reservation id → room id
    reservation_to_room: DashMap<Ulid, Ulid>,
    /// Owner → reservation ids, for per-principal listings.
    owner_reservations: DashMap<Ulid, Vec<Ulid>>,
    principals: DashMap<Ulid, Principal>,
    principal_ids: DashMap<String, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            room_names: DashMap::new(),
            reservation_to_room: DashMap::new(),
            owner_reservations: DashMap::new(),
            principals: DashMap::new(),
            principal_ids: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoom> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn rooms(&self) -> Vec<SharedRoom> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_room(&self, room: Room) -> SharedRoom {
        let id = room.id;
        self.room_names.insert(room.name.clone(), id);
        let handle = Arc::new(RoomHandle::new(room));
        self.rooms.insert(id, handle.clone());
        handle
    }

    /// Drop a room and every index entry pointing into it.
    pub fn remove_room(&self, id: &Ulid) {
        let Some((_, handle)) = self.rooms.remove(id) else {
            return;
        };
        let mut state = handle.state.write();
        state.deleted = true;
        self.release_name(&state.room.name, id);
        for r in state.reservations() {
            self.reservation_to_room.remove(&r.id);
            if let Some(mut ids) = self.owner_reservations.get_mut(&r.owner_id) {
                ids.retain(|rid| rid != &r.id);
            }
        }
    }

    // ── Name index ───────────────────────────────────────────

    /// Atomically reserve `name` for room `id`. False if another room has it.
    pub fn claim_name(&self, name: &str, id: Ulid) -> bool {
        match self.room_names.entry(name.to_string()) {
            Entry::Occupied(e) => *e.get() == id,
            Entry::Vacant(e) => {
                e.insert(id);
                true
            }
        }
    }

    pub fn release_name(&self, name: &str, id: &Ulid) {
        self.room_names.remove_if(name, |_, owner| owner == id);
    }

    pub fn room_by_name(&self, name: &str) -> Option<Ulid> {
        self.room_names.get(name).map(|e| *e.value())
    }

    // ── Reservation index ────────────────────────────────────

    pub fn room_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_room.get(reservation_id).map(|e| *e.value())
    }

    pub fn owner_reservation_ids(&self, owner_id: &Ulid) -> Vec<Ulid> {
        self.owner_reservations
            .get(owner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Principals ───────────────────────────────────────────

    pub fn principal_count(&self) -> usize {
        self.principals.len()
    }

    /// Atomically reserve an external id. False if already registered.
    pub fn claim_external_id(&self, external_id: &str, id: Ulid) -> bool {
        match self.principal_ids.entry(external_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(id);
                true
            }
        }
    }

    pub fn release_external_id(&self, external_id: &str, id: &Ulid) {
        self.principal_ids.remove_if(external_id, |_, owner| owner == id);
    }

    pub fn get_principal(&self, id: &Ulid) -> Option<Principal> {
        self.principals.get(id).map(|e| e.value().clone())
    }

    pub fn find_principal(&self, external_id: &str) -> Option<Principal> {
        let id = *self.principal_ids.get(external_id)?.value();
        self.get_principal(&id)
    }

    pub fn principals(&self) -> Vec<Principal> {
        self.principals.iter().map(|e| e.value().clone()).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a room-scoped event to a room the caller has locked.
    pub fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::ReservationCommitted { reservation } => {
                self.reservation_to_room
                    .insert(reservation.id, reservation.room_id);
                self.owner_reservations
                    .entry(reservation.owner_id)
                    .or_default()
                    .push(reservation.id);
                rs.insert_reservation(reservation.clone());
            }
            Event::ReservationAmended { id, span, .. } => {
                if let Some(mut r) = rs.remove_reservation(*id) {
                    r.span = *span;
                    rs.insert_reservation(r);
                }
            }
            Event::ReservationCancelled { id, .. } => {
                rs.cancel_reservation(*id);
            }
            Event::RoomUpdated { room } => {
                if rs.room.name != room.name {
                    self.release_name(&rs.room.name, &room.id);
                    self.room_names.insert(room.name.clone(), room.id);
                }
                rs.room = room.clone();
            }
            // Room creation/deletion and principals live at the map level, not here
            Event::RoomCreated { .. }
            | Event::RoomDeleted { .. }
            | Event::PrincipalRegistered { .. } => {}
        }
    }

    /// Rebuild state from a WAL event. Runs before the engine is shared.
    pub fn replay_event(&self, event: &Event) {
        match event {
            Event::RoomCreated { room } => {
                self.insert_room(room.clone());
            }
            Event::RoomDeleted { id } => self.remove_room(id),
            Event::PrincipalRegistered { principal } => {
                self.principal_ids
                    .insert(principal.external_id.clone(), principal.id);
                self.principals.insert(principal.id, principal.clone());
            }
            other => {
                if let Some(room_id) = other.room_id()
                    && let Some(handle) = self.get_room(&room_id)
                {
                    let mut guard = handle.state.write();
                    self.apply_event(&mut guard, other);
                }
            }
        }
    }

    pub fn insert_principal(&self, principal: Principal) {
        self.principals.insert(principal.id, principal);
    }
}
