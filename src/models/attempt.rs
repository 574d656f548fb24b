// src/models/attempt.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::question::{PublicQuestion, QuestionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    InProgress,
    /// Terminal. Answers are immutable from here on.
    Submitted,
}

/// One user's timed run through a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSession {
    pub id: String,
    pub test_id: String,
    pub scope_id: String,
    pub user_id: String,
    pub display_name: String,

    /// True when the test is a daily auto-slot.
    #[serde(default)]
    pub auto_slot: bool,

    pub started_at: DateTime<Utc>,

    /// `min(test end, started_at + duration)`.
    pub deadline: DateTime<Utc>,

    pub submitted_at: Option<DateTime<Utc>>,

    /// The test's questions in this user's presentation order.
    pub question_order: Vec<QuestionId>,

    /// Every question of the test; `None` means unanswered.
    pub answers: BTreeMap<QuestionId, Option<usize>>,

    /// Position of the question currently shown to the user.
    #[serde(default)]
    pub current_index: usize,

    pub state: AttemptState,

    /// Set when the session was closed by its deadline rather than by the user.
    #[serde(default)]
    pub auto_submitted: bool,

    pub result: Option<ScoredResult>,
}

impl AttemptSession {
    pub fn is_submitted(&self) -> bool {
        self.state == AttemptState::Submitted
    }
}

/// Per-category accuracy within a scored attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category_id: String,
    pub correct: u32,
    pub wrong: u32,
    pub unanswered: u32,
    pub total: u32,
    /// Rounded percentage of correct answers in this category.
    pub accuracy: u32,
}

/// Grader output. Derived from answers and the answer key; never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub attempt_id: String,
    pub correct: u32,
    pub wrong: u32,
    pub unanswered: u32,
    /// Questions still in the bank; the percentage denominator.
    pub total: u32,
    /// Questions removed from the bank since the test was created.
    pub excluded: u32,
    pub percentage: u32,
    pub time_taken_seconds: i64,
    pub per_category: Vec<CategoryBreakdown>,
}

/// How a start request was resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "session", rename_all = "snake_case")]
pub enum AttemptStart {
    Started(AttemptSession),
    /// A session already existed and is still running.
    Resumed(AttemptSession),
    /// The user already finished this test.
    AlreadySubmitted(AttemptSession),
}

impl AttemptStart {
    pub fn session(&self) -> &AttemptSession {
        match self {
            AttemptStart::Started(s)
            | AttemptStart::Resumed(s)
            | AttemptStart::AlreadySubmitted(s) => s,
        }
    }

    pub fn into_session(self) -> AttemptSession {
        match self {
            AttemptStart::Started(s)
            | AttemptStart::Resumed(s)
            | AttemptStart::AlreadySubmitted(s) => s,
        }
    }
}

/// A session as shown to its owner while taking the test.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaperView {
    pub session: AttemptSession,
    /// Questions in presentation order. Questions deleted from the bank are omitted.
    pub questions: Vec<PublicQuestion>,
    pub remaining_seconds: i64,
}

/// Per-question review shown once results are released and solutions are enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub question_id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub explanation: Option<String>,
    pub selected: Option<usize>,
}

/// What the owner of a session may currently see of its outcome.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultView {
    InProgress {
        deadline: DateTime<Utc>,
    },
    Pending {
        available_at: Option<DateTime<Utc>>,
    },
    Released {
        result: ScoredResult,
        /// Whether `solutions` may be requested for this attempt.
        solutions_available: bool,
    },
}

/// DTO for recording (or clearing) one answer.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: QuestionId,
    /// `None` clears the selection.
    pub option_index: Option<usize>,
}

/// DTO for moving between questions.
#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub index: usize,
}
