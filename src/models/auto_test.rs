// src/models/auto_test.rs

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    models::test_definition::{SourcingConfig, TestDefinition},
};

/// Standing per-scope configuration of the daily auto-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AutoTestConfig {
    #[serde(default)]
    pub scope_id: String,

    pub enabled: bool,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    pub sourcing: SourcingConfig,

    /// Local time the daily window opens.
    pub daily_start_time: NaiveTime,

    /// Local time the daily window closes (exclusive).
    pub daily_end_time: NaiveTime,

    /// 0 = Sunday .. 6 = Saturday.
    pub active_days_of_week: BTreeSet<u8>,

    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: u32,

    #[serde(default)]
    pub result_release_time: Option<NaiveTime>,

    #[validate(range(min = 1, max = 500))]
    pub question_count: usize,

    #[serde(default)]
    pub show_solutions: bool,

    #[serde(default = "default_true")]
    pub show_leaderboard: bool,
}

fn default_true() -> bool {
    true
}

impl AutoTestConfig {
    /// Checks the invariants the validator derive cannot express.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        self.sourcing.validate()?;
        if self.daily_end_time <= self.daily_start_time {
            return Err(AppError::BadRequest(
                "daily_end_time must be after daily_start_time".to_string(),
            ));
        }
        if let SourcingConfig::Dynamic { count, .. } = &self.sourcing {
            if *count != self.question_count {
                return Err(AppError::BadRequest(
                    "sourcing count must equal question_count".to_string(),
                ));
            }
        }
        if let Some(day) = self.active_days_of_week.iter().find(|d| **d > 6) {
            return Err(AppError::BadRequest(format!(
                "active day {day} is outside 0..=6"
            )));
        }
        Ok(())
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.active_days_of_week.contains(&weekday_number(date.weekday()))
    }
}

/// Sunday-based weekday number.
pub fn weekday_number(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

/// Today's auto-slot as offered to one user.
#[derive(Debug, Serialize, Deserialize)]
pub struct DailySlotView {
    pub test: Option<TestDefinition>,
    pub completed_today: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_definition::PoolSelector;

    fn config(count: usize, question_count: usize) -> AutoTestConfig {
        AutoTestConfig {
            scope_id: "g1".into(),
            enabled: true,
            title: "Daily".into(),
            sourcing: SourcingConfig::Dynamic {
                pool: PoolSelector {
                    category_id: Some("algebra".into()),
                    ..Default::default()
                },
                difficulty: None,
                count,
                strict: false,
            },
            daily_start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            daily_end_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            active_days_of_week: (0..=6).collect(),
            duration_minutes: 15,
            result_release_time: None,
            question_count,
            show_solutions: false,
            show_leaderboard: true,
        }
    }

    #[test]
    fn test_dynamic_count_must_match_question_count() {
        assert!(config(3, 3).check().is_ok());
        assert!(matches!(
            config(5, 3).check(),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_weekday_numbers_start_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(weekday_number(sunday.weekday()), 0);

        let mut cfg = config(3, 3);
        cfg.active_days_of_week = [1].into_iter().collect();
        assert!(!cfg.is_active_on(sunday));
        assert!(cfg.is_active_on(sunday.succ_opt().unwrap()));
    }
}
