//! Hard caps that keep a single engine's memory and WAL bounded.

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_ROOM_NAME_LEN: usize = 64;
pub const MAX_ROOM_CAPACITY: u32 = 1_000;

/// Default cap on active reservations per room. Cancelled history does not count.
pub const MAX_ACTIVE_RESERVATIONS_PER_ROOM: usize = 100_000;

pub const MAX_PRINCIPALS: usize = 1_000_000;
pub const MAX_EXTERNAL_ID_LEN: usize = 255;
pub const MAX_PRINCIPAL_NAME_LEN: usize = 100;
pub const MAX_ROLE_LEN: usize = 50;
