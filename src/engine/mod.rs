// src/engine/mod.rs

//! Timed assessment engine.
//!
//! The submodules are side-effect free: they take records and a `now` and
//! return decisions. `AssessmentEngine` is the thin layer that reads and
//! writes the document store around them.

pub mod grader;
pub mod leaderboard;
pub mod lifecycle;
pub mod release_gate;
pub mod resolver;
pub mod sampler;
pub mod scheduler;
pub mod service;
pub mod session;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

pub use service::AssessmentEngine;

/// Calendar day of `at` in the configured offset.
pub fn local_date(at: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Time of day of `at` in the configured offset.
pub fn local_time(at: DateTime<Utc>, tz: FixedOffset) -> NaiveTime {
    at.with_timezone(&tz).time()
}

/// The UTC instant of a local date and time.
pub fn local_instant(date: NaiveDate, time: NaiveTime, tz: FixedOffset) -> DateTime<Utc> {
    (date.and_time(time) - Duration::seconds(i64::from(tz.local_minus_utc()))).and_utc()
}
