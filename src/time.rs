//! Canonical civil time.
//!
//! Every timestamp entering the engine passes through [`Clock`] exactly once and
//! leaves as `Ms`. Time-of-day checks and "HH:MM" rendering are done in the
//! clock's zone and nowhere else.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::engine::{EngineError, WindowViolation};
use crate::model::{Ms, Span};

/// Zone used when none is configured.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Bangkok;

/// A timestamp as a caller hands it in: with an explicit offset, or as
/// wall-clock time that is read in the canonical zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInput {
    Zoned(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

impl From<DateTime<FixedOffset>> for TimeInput {
    fn from(value: DateTime<FixedOffset>) -> Self {
        TimeInput::Zoned(value)
    }
}

impl From<DateTime<Utc>> for TimeInput {
    fn from(value: DateTime<Utc>) -> Self {
        TimeInput::Zoned(value.fixed_offset())
    }
}

impl From<NaiveDateTime> for TimeInput {
    fn from(value: NaiveDateTime) -> Self {
        TimeInput::Local(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    tz: Tz,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl Clock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Express any input timestamp in the canonical zone.
    ///
    /// Ambiguous wall-clock times (DST fold) take the earlier instant; wall-clock
    /// times that do not exist (DST gap) are rejected.
    pub fn normalize(&self, input: impl Into<TimeInput>) -> Result<DateTime<Tz>, EngineError> {
        match input.into() {
            TimeInput::Zoned(dt) => Ok(dt.with_timezone(&self.tz)),
            TimeInput::Local(naive) => naive
                .and_local_timezone(self.tz)
                .earliest()
                .ok_or(EngineError::InvalidWindow(WindowViolation::NonexistentLocalTime)),
        }
    }

    pub fn to_ms(&self, input: impl Into<TimeInput>) -> Result<Ms, EngineError> {
        Ok(self.normalize(input)?.timestamp_millis())
    }

    /// The civil view of a stored instant.
    pub fn civil(&self, ms: Ms) -> DateTime<Tz> {
        let utc = DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC);
        utc.with_timezone(&self.tz)
    }

    pub fn civil_date(&self, ms: Ms) -> NaiveDate {
        self.civil(ms).date_naive()
    }

    pub fn time_of_day(&self, ms: Ms) -> NaiveTime {
        self.civil(ms).time()
    }

    /// First instant of `date` in the canonical zone. A midnight swallowed by a
    /// DST gap falls forward to the first wall-clock time that exists.
    pub fn start_of_day(&self, date: NaiveDate) -> Ms {
        let midnight = date.and_time(NaiveTime::MIN);
        let mut candidate = midnight;
        for _ in 0..4 {
            if let Some(dt) = self.tz.from_local_datetime(&candidate).earliest() {
                return dt.timestamp_millis();
            }
            candidate += TimeDelta::minutes(30);
        }
        midnight.and_utc().timestamp_millis()
    }

    /// `[00:00, next 00:00)` of `date` in the canonical zone.
    pub fn day_span(&self, date: NaiveDate) -> Span {
        let start = self.start_of_day(date);
        let end = date
            .succ_opt()
            .map(|next| self.start_of_day(next))
            .unwrap_or(start + 24 * crate::model::HOUR_MS);
        Span::new(start, end)
    }

    /// Instant of a wall-clock time on `date`, read in the canonical zone.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Result<Ms, EngineError> {
        self.to_ms(date.and_time(time))
    }

    /// "HH:MM" of an instant inside `day`. The day's exclusive end renders as "24:00".
    pub fn clock_string(&self, ms: Ms, day: &Span) -> String {
        if ms >= day.end {
            return "24:00".to_string();
        }
        self.civil(ms).format("%H:%M").to_string()
    }

    pub fn now_ms() -> Ms {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HOUR_MS;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn naive_input_is_read_in_canonical_zone() {
        let clock = Clock::default();
        let naive = date(2025, 3, 10).and_hms_opt(9, 0, 0).unwrap();
        let dt = clock.normalize(naive).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "09:00");
        // Bangkok is UTC+7 all year.
        assert_eq!(dt.naive_utc(), date(2025, 3, 10).and_hms_opt(2, 0, 0).unwrap());
    }

    #[test]
    fn zoned_and_naive_inputs_agree() {
        let clock = Clock::default();
        let naive = date(2025, 3, 10).and_hms_opt(9, 30, 0).unwrap();
        let utc = Utc.with_ymd_and_hms(2025, 3, 10, 2, 30, 0).unwrap();
        let offset = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 10, 11, 30, 0)
            .unwrap();
        let a = clock.to_ms(naive).unwrap();
        assert_eq!(a, clock.to_ms(utc).unwrap());
        assert_eq!(a, clock.to_ms(offset).unwrap());
    }

    #[test]
    fn day_span_is_24_hours_in_fixed_zone() {
        let clock = Clock::default();
        let day = clock.day_span(date(2025, 3, 10));
        assert_eq!(day.duration_ms(), 24 * HOUR_MS);
        assert_eq!(clock.clock_string(day.start, &day), "00:00");
        assert_eq!(clock.clock_string(day.end, &day), "24:00");
    }

    #[test]
    fn dst_gap_rejected_and_day_span_shrinks() {
        let clock = Clock::new(chrono_tz::Europe::Berlin);
        // 2025-03-30 02:30 does not exist in Berlin.
        let gap = date(2025, 3, 30).and_hms_opt(2, 30, 0).unwrap();
        assert!(matches!(
            clock.normalize(gap),
            Err(EngineError::InvalidWindow(WindowViolation::NonexistentLocalTime))
        ));
        assert_eq!(clock.day_span(date(2025, 3, 30)).duration_ms(), 23 * HOUR_MS);
    }

    #[test]
    fn dst_fold_takes_earliest() {
        let clock = Clock::new(chrono_tz::Europe::Berlin);
        // 2025-10-26 02:30 happens twice; the first one is still at +02:00.
        let fold = date(2025, 10, 26).and_hms_opt(2, 30, 0).unwrap();
        let dt = clock.normalize(fold).unwrap();
        assert_eq!(dt.naive_utc(), date(2025, 10, 26).and_hms_opt(0, 30, 0).unwrap());
    }

    #[test]
    fn civil_roundtrip() {
        let clock = Clock::default();
        let ms = clock.at(date(2025, 1, 1), NaiveTime::from_hms_opt(19, 45, 0).unwrap()).unwrap();
        assert_eq!(clock.civil_date(ms), date(2025, 1, 1));
        assert_eq!(clock.time_of_day(ms), NaiveTime::from_hms_opt(19, 45, 0).unwrap());
    }
}
