use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ulid::Ulid;

use roomres::config::EngineConfig;
use roomres::engine::{Engine, EngineError};
use roomres::model::*;
use roomres::notify::NotifyHub;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap_or_default()
}

/// The i-th one-hour slot, twelve per day starting at 08:00.
fn hourly_slot(i: usize) -> (NaiveDateTime, NaiveDateTime) {
    let date = base_date() + TimeDelta::days((i / 12) as i64);
    let start = date.and_hms_opt(8, 0, 0).unwrap_or_default() + TimeDelta::hours((i % 12) as i64);
    (start, start + TimeDelta::hours(1))
}

fn start_engine() -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("roomres_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let engine = Engine::new(dir.join("bench.wal"), EngineConfig::default(), Arc::new(NotifyHub::new()))
        .expect("start engine");
    Arc::new(engine)
}

async fn new_room(engine: &Engine, class: RoomClass, capacity: u32) -> Room {
    engine
        .create_room(format!("bench-{}", Ulid::new()), class, capacity, RoomStatus::Available)
        .await
        .expect("create room")
}

async fn phase1_sequential(engine: &Engine) {
    let room = new_room(engine, RoomClass::A, 1).await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let (s, e) = hourly_slot(i);
        let t = Instant::now();
        engine
            .create_reservation(room.id, Ulid::new(), s, e, 1)
            .await
            .expect("sequential booking");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_distinct_rooms(engine: &Arc<Engine>) {
    let n_tasks = 10;
    let n_per_task = 200;
    let mut rooms = Vec::new();
    for _ in 0..n_tasks {
        rooms.push(new_room(engine, RoomClass::B, 5).await);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for room in rooms {
        let engine = engine.clone();
        let room_id = room.id;
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let (s, e) = hourly_slot(j);
                engine
                    .create_reservation(room_id, Ulid::new(), s, e, 3)
                    .await
                    .expect("parallel booking");
            }
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} rooms x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contended_room(engine: &Arc<Engine>) {
    let room = new_room(engine, RoomClass::A, 1).await;
    let n_clients = 50;
    let slots = 24;
    let committed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let retries = Arc::new(AtomicUsize::new(0));
    let room_id = room.id;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_clients {
        let engine = engine.clone();
        let (committed, conflicts, retries) = (committed.clone(), conflicts.clone(), retries.clone());
        handles.push(tokio::spawn(async move {
            // Every client races for every slot.
            for i in 0..slots {
                let (s, e) = hourly_slot(i);
                match engine.create_reservation(room_id, Ulid::new(), s, e, 1).await {
                    Ok(_) => committed.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict(_)) => conflicts.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::RetryLater(_)) => retries.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let won = committed.load(Ordering::Relaxed);
    println!(
        "  {n_clients} clients x {slots} slots in {:.2}s: {won} committed, {} conflicts, {} retry-later",
        start.elapsed().as_secs_f64(),
        conflicts.load(Ordering::Relaxed),
        retries.load(Ordering::Relaxed),
    );
    assert_eq!(won, slots, "every slot must be won exactly once");
}

async fn phase4_read_under_load(engine: &Arc<Engine>) {
    let room = new_room(engine, RoomClass::A, 1).await;
    for i in (0..12).step_by(2) {
        let (s, e) = hourly_slot(i);
        engine
            .create_reservation(room.id, Ulid::new(), s, e, 1)
            .await
            .expect("prefill");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let writer_room = new_room(&engine, RoomClass::A, 1).await;
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                let (s, e) = hourly_slot(i);
                let _ = engine
                    .create_reservation(writer_room.id, Ulid::new(), s, e, 1)
                    .await;
                i += 1;
            }
        }));
    }

    let room_id = room.id;
    let n_readers = 10;
    let reads_per_reader = 2000;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let busy = engine
                    .query_availability(&room_id, base_date())
                    .expect("availability");
                latencies.push(t.elapsed());
                debug_assert_eq!(busy.len(), 6);
                tokio::task::yield_now().await;
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        if let Ok(l) = h.await {
            all_latencies.extend(l);
        }
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    println!("=== roomres stress benchmark ===\n");
    let engine = start_engine();

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&engine).await;

    println!("\n[phase 2] parallel writes on distinct rooms");
    phase2_distinct_rooms(&engine).await;

    println!("\n[phase 3] many clients racing for one room");
    phase3_contended_room(&engine).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&engine).await;

    println!("\n=== done ===");
}
