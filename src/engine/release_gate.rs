// src/engine/release_gate.rs

//! When a computed score may be shown.
//!
//! Nothing is visible before the test window closes. After that, a test
//! without a release time is open immediately. A release time is a daily
//! cutoff: it only holds back results submitted on the current calendar day,
//! results from an earlier day are never locked again.

use chrono::{DateTime, FixedOffset, Utc};

use super::{local_date, local_instant, local_time};
use crate::models::{attempt::AttemptSession, test_definition::TestDefinition};

/// The gate for a submission made at `submitted_at`.
pub fn gate_open(
    test: &TestDefinition,
    submitted_at: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> bool {
    if now < test.end_time {
        return false;
    }
    let Some(release_time) = test.result_release_time else {
        return true;
    };
    if local_date(submitted_at, tz) < local_date(now, tz) {
        return true;
    }
    local_time(now, tz) >= release_time
}

/// Whether the owner of `attempt` may see its score at `now`.
pub fn can_view(
    test: &TestDefinition,
    attempt: &AttemptSession,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> bool {
    match attempt.submitted_at {
        Some(submitted_at) if attempt.is_submitted() => gate_open(test, submitted_at, now, tz),
        _ => false,
    }
}

/// Earliest instant at which `gate_open` turns true for this submission.
pub fn release_instant(
    test: &TestDefinition,
    submitted_at: DateTime<Utc>,
    tz: FixedOffset,
) -> DateTime<Utc> {
    let Some(release_time) = test.result_release_time else {
        return test.end_time;
    };
    let submitted_day = local_date(submitted_at, tz);
    if local_date(test.end_time, tz) > submitted_day {
        return test.end_time;
    }
    test.end_time.max(local_instant(submitted_day, release_time, tz))
}
