use chrono::{DateTime, Local, NaiveDateTime};

/// Format used for the on-frame overlay and the text event log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of capture timestamps.
///
/// The pipeline reads the clock once per tick, so every event and the
/// overlay of one tick share a single instant.
pub trait Clock: Send {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the local time zone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now: DateTime<Local> = Local::now();
        now.naive_local()
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
