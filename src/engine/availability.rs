use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Busy spans of a room inside `day`: every active reservation that intersects
/// the day, clipped to it, sorted by start. Active reservations never overlap,
/// so neither do the results.
pub fn busy_spans(rs: &RoomState, day: &Span) -> Vec<Span> {
    let mut busy: Vec<Span> = rs
        .overlapping_active(day)
        .filter_map(|r| r.span.clip(day))
        .collect();
    busy.sort_by_key(|s| s.start);
    busy
}

/// Free spans inside `window` once `busy` is taken out.
pub fn open_spans(window: &Span, busy: &[Span], min_duration_ms: Option<Ms>) -> Vec<Span> {
    let merged = merge_overlapping(busy);
    let mut free = subtract_intervals(&[*window], &merged);
    if let Some(min_dur) = min_duration_ms {
        free.retain(|span| span.duration_ms() >= min_dur);
    }
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = HOUR_MS;
    const M: Ms = MINUTE_MS;

    fn make_room(reservations: Vec<(Ms, Ms, ReservationStatus)>) -> RoomState {
        let mut rs = RoomState::new(Room {
            id: Ulid::new(),
            name: "A01".into(),
            class: RoomClass::A,
            capacity: 1,
            status: RoomStatus::Available,
        });
        for (start, end, status) in reservations {
            rs.insert_reservation(Reservation {
                id: Ulid::new(),
                owner_id: Ulid::new(),
                room_id: rs.room.id,
                span: Span::new(start, end),
                occupancy: 1,
                status,
                created_at: 0,
            });
        }
        rs
    }

    // ── busy_spans ───────────────────────────────────────

    #[test]
    fn busy_sorted_and_cancelled_excluded() {
        let day = Span::new(0, 24 * H);
        let rs = make_room(vec![
            (14 * H, 15 * H + 30 * M, ReservationStatus::Active),
            (9 * H, 10 * H, ReservationStatus::Active),
            (11 * H, 12 * H, ReservationStatus::Cancelled),
        ]);
        assert_eq!(
            busy_spans(&rs, &day),
            vec![Span::new(9 * H, 10 * H), Span::new(14 * H, 15 * H + 30 * M)]
        );
    }

    #[test]
    fn busy_clipped_to_day() {
        let day = Span::new(24 * H, 48 * H);
        let rs = make_room(vec![
            (22 * H, 26 * H, ReservationStatus::Active),
            (46 * H, 50 * H, ReservationStatus::Active),
            (10 * H, 11 * H, ReservationStatus::Active),
        ]);
        assert_eq!(
            busy_spans(&rs, &day),
            vec![Span::new(24 * H, 26 * H), Span::new(46 * H, 48 * H)]
        );
    }

    #[test]
    fn busy_adjacent_kept_separate() {
        let day = Span::new(0, 24 * H);
        let rs = make_room(vec![
            (9 * H, 10 * H, ReservationStatus::Active),
            (10 * H, 11 * H, ReservationStatus::Active),
        ]);
        assert_eq!(busy_spans(&rs, &day).len(), 2);
    }

    // ── open_spans ───────────────────────────────────────

    #[test]
    fn open_spans_fragmented_by_busy() {
        let window = Span::new(8 * H, 20 * H);
        let busy = vec![Span::new(9 * H, 10 * H), Span::new(14 * H, 15 * H + 30 * M)];
        assert_eq!(
            open_spans(&window, &busy, None),
            vec![
                Span::new(8 * H, 9 * H),
                Span::new(10 * H, 14 * H),
                Span::new(15 * H + 30 * M, 20 * H),
            ]
        );
    }

    #[test]
    fn open_spans_min_duration_filter() {
        let window = Span::new(8 * H, 12 * H);
        let busy = vec![Span::new(8 * H + 30 * M, 11 * H)];
        assert_eq!(
            open_spans(&window, &busy, Some(H)),
            vec![Span::new(11 * H, 12 * H)]
        );
    }

    #[test]
    fn open_spans_fully_busy() {
        let window = Span::new(8 * H, 12 * H);
        let busy = vec![Span::new(7 * H, 10 * H), Span::new(10 * H, 13 * H)];
        assert!(open_spans(&window, &busy, None).is_empty());
    }

    // ── subtract_intervals ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        assert_eq!(subtract_intervals(&base, &remove), base);
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn subtract_empty_removals() {
        let base = vec![Span::new(0, 100)];
        assert_eq!(subtract_intervals(&base, &[]), base);
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300), Span::new(400, 500)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 300), Span::new(400, 500)]
        );
    }

    #[test]
    fn merge_empty() {
        assert!(merge_overlapping(&[]).is_empty());
    }
}
