// src/models/test_definition.rs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{Difficulty, QuestionFilter, QuestionId},
};

/// Pool selector for dynamic sourcing: either a whole category, or a
/// subject optionally narrowed by topic and subtopic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic_id: Option<String>,
}

impl From<&PoolSelector> for QuestionFilter {
    fn from(p: &PoolSelector) -> Self {
        QuestionFilter {
            category_id: p.category_id.clone(),
            subject_id: p.subject_id.clone(),
            topic_id: p.topic_id.clone(),
            subtopic_id: p.subtopic_id.clone(),
        }
    }
}

/// How a test obtains its questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourcingConfig {
    /// A curated, ordered list of question ids.
    Fixed { question_ids: Vec<QuestionId> },

    /// A random draw of `count` questions from a filtered pool.
    Dynamic {
        pool: PoolSelector,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
        count: usize,
        /// Reject draws that cannot be filled completely instead of
        /// accepting a smaller test.
        #[serde(default)]
        strict: bool,
    },
}

impl SourcingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            SourcingConfig::Fixed { question_ids } => {
                if question_ids.is_empty() {
                    return Err(AppError::BadRequest(
                        "fixed sourcing needs at least one question id".to_string(),
                    ));
                }
                let mut seen = std::collections::HashSet::new();
                if let Some(dup) = question_ids.iter().find(|id| !seen.insert(id.as_str())) {
                    return Err(AppError::BadRequest(format!(
                        "question id '{dup}' appears more than once"
                    )));
                }
            }
            SourcingConfig::Dynamic { pool, count, .. } => {
                if *count == 0 {
                    return Err(AppError::BadRequest(
                        "dynamic sourcing count must be at least 1".to_string(),
                    ));
                }
                if pool.category_id.is_none() && pool.subject_id.is_none() {
                    return Err(AppError::BadRequest(
                        "dynamic pool needs a category or a subject".to_string(),
                    ));
                }
                if pool.subject_id.is_none()
                    && (pool.topic_id.is_some() || pool.subtopic_id.is_some())
                {
                    return Err(AppError::BadRequest(
                        "topic filters require a subject".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Lifecycle of a test, derived from the wall clock. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Scheduled,
    Active,
    Ended,
}

/// A scheduled assessment with a frozen question set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: String,

    /// Group or course that owns the test.
    pub owner_scope_id: String,

    pub title: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub duration_minutes: u32,

    pub sourcing: SourcingConfig,

    /// Materialized draw. Immutable after creation.
    pub question_ids: Vec<QuestionId>,

    /// Daily time-of-day cutoff, not an absolute instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_release_time: Option<NaiveTime>,

    pub show_solutions: bool,

    pub show_leaderboard: bool,

    /// Set on tests generated by the recurring scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_slot_date: Option<NaiveDate>,

    pub created_by: String,

    pub created_at: DateTime<Utc>,
}

/// A test together with its lifecycle state at the time of the response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestView {
    #[serde(flatten)]
    pub test: TestDefinition,
    pub state: LifecycleState,
}

/// DTO for creating a test.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: u32,
    pub sourcing: SourcingConfig,
    pub result_release_time: Option<NaiveTime>,
    #[serde(default)]
    pub show_solutions: bool,
    #[serde(default = "default_true")]
    pub show_leaderboard: bool,
}

fn default_true() -> bool {
    true
}

/// DTO for the only post-creation edit a test accepts.
#[derive(Debug, Deserialize, Validate)]
pub struct RenameTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
}
