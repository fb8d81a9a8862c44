//! Process configuration, read from `ROOMRES_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use thiserror::Error;

use crate::engine::WindowPolicy;
use crate::limits::MAX_ACTIVE_RESERVATIONS_PER_ROOM;
use crate::model::MINUTE_MS;
use crate::time::DEFAULT_TIMEZONE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("operating hours must open before they close ({opens_at} >= {closes_at})")]
    EmptyHours {
        opens_at: NaiveTime,
        closes_at: NaiveTime,
    },
}

/// Knobs the engine itself consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Zone for wall-clock input, operating hours and "HH:MM" output.
    pub timezone: Tz,
    /// Upper bound on waiting for a room's commit lock.
    pub lock_timeout: Duration,
    pub window: WindowPolicy,
    pub max_active_reservations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            lock_timeout: Duration::from_secs(5),
            window: WindowPolicy::default(),
            max_active_reservations: MAX_ACTIVE_RESERVATIONS_PER_ROOM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends between background compactions.
    pub compact_threshold: u64,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset variables keep their default;
    /// set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(dir) = lookup("ROOMRES_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.metrics_port = parse_var(&lookup, "ROOMRES_METRICS_PORT", str::parse::<u16>)?;
        if let Some(n) = parse_var(&lookup, "ROOMRES_COMPACT_THRESHOLD", str::parse::<u64>)? {
            config.compact_threshold = n;
        }
        if let Some(tz) = parse_var(&lookup, "ROOMRES_TIMEZONE", str::parse::<Tz>)? {
            config.engine.timezone = tz;
        }
        if let Some(ms) = parse_var(&lookup, "ROOMRES_LOCK_TIMEOUT_MS", str::parse::<u64>)? {
            config.engine.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "ROOMRES_MAX_ACTIVE_RESERVATIONS", str::parse::<usize>)? {
            config.engine.max_active_reservations = n;
        }

        let window = &mut config.engine.window;
        if let Some(t) = parse_var(&lookup, "ROOMRES_OPENS_AT", parse_clock)? {
            window.opens_at = t;
        }
        if let Some(t) = parse_var(&lookup, "ROOMRES_CLOSES_AT", parse_clock)? {
            window.closes_at = t;
        }
        if let Some(minutes) = parse_var(&lookup, "ROOMRES_MAX_DURATION_MINUTES", |s| {
            s.parse::<i64>().ok().filter(|m| *m > 0).ok_or(())
        })? {
            window.max_duration_ms = minutes * MINUTE_MS;
        }
        if window.opens_at >= window.closes_at {
            return Err(ConfigError::EmptyHours {
                opens_at: window.opens_at,
                closes_at: window.closes_at,
            });
        }

        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roomres.wal")
    }
}

fn parse_clock(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
}

fn parse_var<T, E>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    parse(raw.trim())
        .map(Some)
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}
