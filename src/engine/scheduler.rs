// src/engine/scheduler.rs

//! Daily auto-test slots.
//!
//! A scope's `AutoTestConfig` yields at most one test per calendar day. The
//! slot id is derived from the scope and the date so repeated checks on the
//! same day land on the same document, while every day draws its own
//! questions.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::{local_date, local_instant};
use crate::models::{
    attempt::AttemptSession,
    auto_test::AutoTestConfig,
    question::QuestionId,
    test_definition::{SourcingConfig, TestDefinition},
};

/// Whether a slot may be materialized for a date at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    /// The configuration is disabled or the weekday is not active.
    Inactive,
    /// Active day, but `now` is outside the daily window.
    OutsideWindow,
    Open {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub fn slot_id(scope_id: &str, date: NaiveDate) -> String {
    format!("auto:{scope_id}:{}", date.format("%Y-%m-%d"))
}

/// The daily window of `date` as UTC instants.
pub fn daily_window(
    config: &AutoTestConfig,
    date: NaiveDate,
    tz: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        local_instant(date, config.daily_start_time, tz),
        local_instant(date, config.daily_end_time, tz),
    )
}

pub fn decide(
    config: &AutoTestConfig,
    date: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> SlotDecision {
    if !config.enabled || !config.is_active_on(date) {
        return SlotDecision::Inactive;
    }
    let (start, end) = daily_window(config, date, tz);
    if now < start || now >= end {
        return SlotDecision::OutsideWindow;
    }
    SlotDecision::Open { start, end }
}

/// Whether the slot draw must be filled completely.
pub fn strict_sourcing(config: &AutoTestConfig) -> bool {
    match &config.sourcing {
        SourcingConfig::Fixed { .. } => true,
        SourcingConfig::Dynamic { strict, .. } => *strict,
    }
}

/// Builds the ephemeral test for one day.
pub fn build_slot(
    config: &AutoTestConfig,
    date: NaiveDate,
    window: (DateTime<Utc>, DateTime<Utc>),
    question_ids: Vec<QuestionId>,
    now: DateTime<Utc>,
) -> TestDefinition {
    TestDefinition {
        id: slot_id(&config.scope_id, date),
        owner_scope_id: config.scope_id.clone(),
        title: config.title.clone(),
        start_time: window.0,
        end_time: window.1,
        duration_minutes: config.duration_minutes,
        sourcing: config.sourcing.clone(),
        question_ids,
        result_release_time: config.result_release_time,
        show_solutions: config.show_solutions,
        show_leaderboard: config.show_leaderboard,
        auto_slot_date: Some(date),
        created_by: "scheduler".to_string(),
        created_at: now,
    }
}

/// Completion dedup: a user who submitted any auto-slot of the scope on
/// `date` is done for the day, whatever that slot's id was.
pub fn completed_on(
    sessions: &[AttemptSession],
    scope_id: &str,
    date: NaiveDate,
    tz: FixedOffset,
) -> bool {
    sessions.iter().any(|s| {
        s.auto_slot
            && s.scope_id == scope_id
            && s.is_submitted()
            && s.submitted_at.is_some_and(|at| local_date(at, tz) == date)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveTime, TimeZone};

    use super::*;
    use crate::engine::test_support::{submitted_session, test_definition};
    use crate::models::test_definition::PoolSelector;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn config() -> AutoTestConfig {
        AutoTestConfig {
            scope_id: "g1".into(),
            enabled: true,
            title: "Daily".into(),
            sourcing: SourcingConfig::Dynamic {
                pool: PoolSelector {
                    category_id: Some("math".into()),
                    ..Default::default()
                },
                difficulty: None,
                count: 5,
                strict: false,
            },
            daily_start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            daily_end_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            active_days_of_week: BTreeSet::from([1, 3, 5]),
            duration_minutes: 15,
            result_release_time: None,
            question_count: 5,
            show_solutions: false,
            show_leaderboard: true,
        }
    }

    // 2025-03-10 is a Monday.
    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_inactive_weekday_never_opens() {
        let cfg = config();
        for h in [0, 9, 10, 15, 21, 23] {
            let now = Utc.with_ymd_and_hms(2025, 3, 11, h, 0, 0).unwrap();
            assert_eq!(decide(&cfg, day(11), now, utc()), SlotDecision::Inactive);
        }
    }

    #[test]
    fn test_active_day_window() {
        let cfg = config();
        let before = Utc.with_ymd_and_hms(2025, 3, 10, 9, 59, 0).unwrap();
        let inside = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
        let closing = Utc.with_ymd_and_hms(2025, 3, 10, 22, 0, 0).unwrap();

        assert_eq!(decide(&cfg, day(10), before, utc()), SlotDecision::OutsideWindow);
        assert!(matches!(decide(&cfg, day(10), inside, utc()), SlotDecision::Open { .. }));
        assert_eq!(decide(&cfg, day(10), closing, utc()), SlotDecision::OutsideWindow);
    }

    #[test]
    fn test_disabled_config_is_inactive() {
        let mut cfg = config();
        cfg.enabled = false;
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(decide(&cfg, day(10), now, utc()), SlotDecision::Inactive);
    }

    #[test]
    fn test_slot_ids_are_per_day() {
        assert_eq!(slot_id("g1", day(10)), "auto:g1:2025-03-10");
        assert_ne!(slot_id("g1", day(10)), slot_id("g1", day(12)));
    }

    #[test]
    fn test_completion_matches_calendar_day_not_slot_id() {
        let monday = test_definition(
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 22, 0, 0).unwrap(),
            15,
        );
        let mut s = submitted_session(&monday, Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap());
        s.auto_slot = true;
        s.scope_id = "g1".into();
        let sessions = vec![s];

        assert!(completed_on(&sessions, "g1", day(10), utc()));
        assert!(!completed_on(&sessions, "g1", day(12), utc()));
        assert!(!completed_on(&sessions, "g2", day(10), utc()));
    }
}
