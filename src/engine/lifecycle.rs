// src/engine/lifecycle.rs

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::AppError,
    models::test_definition::{LifecycleState, TestDefinition},
};

/// Lifecycle of a `[start, end)` window at `now`.
pub fn lifecycle_state(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> LifecycleState {
    if now < start {
        LifecycleState::Scheduled
    } else if now < end {
        LifecycleState::Active
    } else {
        LifecycleState::Ended
    }
}

/// Rejects windows that could never host an attempt.
pub fn validate_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration_minutes: u32,
) -> Result<(), AppError> {
    if end <= start {
        return Err(AppError::BadRequest(
            "end_time must be after start_time".to_string(),
        ));
    }
    if duration_minutes == 0 {
        return Err(AppError::BadRequest(
            "duration_minutes must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl TestDefinition {
    pub fn lifecycle(&self, now: DateTime<Utc>) -> LifecycleState {
        lifecycle_state(self.start_time, self.end_time, now)
    }

    /// The earlier of the test's end and the session's own allotment.
    pub fn personal_deadline(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        let allotted = started_at + Duration::minutes(i64::from(self.duration_minutes));
        allotted.min(self.end_time)
    }
}
