mod availability;
mod conflict;
mod error;
mod mutations;
pub mod policy;
mod queries;
mod store;

pub use availability::{busy_spans, merge_overlapping, open_spans, subtract_intervals};
pub use conflict::find_conflict;
pub use error::{EngineError, OccupancyBound, WindowViolation};
pub use policy::{OCCUPANCY_RULES, OccupancyRange, WindowPolicy};
pub use store::{InMemoryStore, RoomHandle, SharedRoom};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedMutexGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::time::Clock;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(batch = batch.len(), "WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Exclusive right to run the commit protocol on one room. Dropping it releases the room.
pub struct RoomCommit {
    pub room_id: Ulid,
    pub room: SharedRoom,
    _guard: OwnedMutexGuard<()>,
}

pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub clock: Clock,
    pub(super) window: WindowPolicy,
    pub(super) lock_timeout: Duration,
    pub(super) max_active_reservations: usize,
    /// Appends hold this shared; compaction holds it exclusively.
    pub(super) wal_barrier: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            notify,
            clock: Clock::new(config.timezone),
            window: config.window,
            lock_timeout: config.lock_timeout,
            max_active_reservations: config.max_active_reservations,
            wal_barrier: RwLock::new(()),
        };

        // We're the sole owner of the store here, so every lock is uncontended.
        for event in &events {
            engine.store.replay_event(event);
        }
        metrics::gauge!(observability::ROOMS_ACTIVE).set(engine.store.room_count() as f64);
        tracing::info!(
            events = events.len(),
            rooms = engine.store.room_count(),
            timezone = %config.timezone,
            "engine state replayed from {}",
            wal_path.display()
        );

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| internal("WAL writer shut down"))?;
        rx.await
            .map_err(|_| internal("WAL writer dropped response"))?
            .map_err(|e| internal(format!("WAL append failed: {e}")))
    }

    /// Acquire the commit right for a room, waiting at most `lock_timeout`.
    ///
    /// Timing out is `RetryLater`, never `Conflict`. A room deleted while we
    /// waited is `RoomNotFound`.
    pub(super) async fn lock_room(&self, room_id: Ulid) -> Result<RoomCommit, EngineError> {
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let wait_start = Instant::now();
        let guard = match tokio::time::timeout(self.lock_timeout, room.commit.clone().lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                metrics::counter!(observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!(
                    %room_id,
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "commit lock wait timed out"
                );
                return Err(EngineError::RetryLater(room_id));
            }
        };
        metrics::histogram!(observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());

        if room.state.read().deleted {
            return Err(EngineError::RoomNotFound(room_id));
        }
        Ok(RoomCommit {
            room_id,
            room,
            _guard: guard,
        })
    }

    /// Lookup reservation → room, then acquire that room's commit right.
    pub(super) async fn lock_reservation_room(&self, reservation_id: Ulid) -> Result<RoomCommit, EngineError> {
        let room_id = self
            .store
            .room_for_reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;
        match self.lock_room(room_id).await {
            Err(EngineError::RoomNotFound(_)) => Err(EngineError::NotFound(reservation_id)),
            other => other,
        }
    }
}

fn internal(detail: impl Into<String>) -> EngineError {
    let detail = detail.into();
    tracing::error!("storage failure: {detail}");
    EngineError::Internal(detail)
}
