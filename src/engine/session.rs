// src/engine/session.rs

//! Attempt session state machine: `InProgress -> Submitted`.
//!
//! These functions only transform an in-memory session; persisting the
//! result is the caller's job. Every mutating function returns whether it
//! changed anything so unchanged sessions are not rewritten.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;

use super::{grader, sampler};
use crate::{
    bank::AnswerKey,
    error::AppError,
    models::{
        attempt::{AttemptSession, AttemptState},
        test_definition::TestDefinition,
    },
};

/// One session per (test, user); the id is derived so concurrent starts collide.
pub fn session_id(test_id: &str, user_id: &str) -> String {
    format!("{test_id}:{user_id}")
}

/// A fresh session with every question pre-populated as unanswered.
pub fn open<R: Rng + ?Sized>(
    test: &TestDefinition,
    user_id: &str,
    display_name: &str,
    now: DateTime<Utc>,
    rng: &mut R,
) -> AttemptSession {
    let answers: BTreeMap<_, _> = test.question_ids.iter().map(|q| (q.clone(), None)).collect();

    AttemptSession {
        id: session_id(&test.id, user_id),
        test_id: test.id.clone(),
        scope_id: test.owner_scope_id.clone(),
        user_id: user_id.to_string(),
        display_name: display_name.to_string(),
        auto_slot: test.auto_slot_date.is_some(),
        started_at: now,
        deadline: test.personal_deadline(now),
        submitted_at: None,
        question_order: sampler::shuffled(&test.question_ids, rng),
        answers,
        current_index: 0,
        state: AttemptState::InProgress,
        auto_submitted: false,
        result: None,
    }
}

pub fn is_expired(session: &AttemptSession, now: DateTime<Utc>) -> bool {
    session.state == AttemptState::InProgress && now >= session.deadline
}

pub fn remaining_seconds(session: &AttemptSession, now: DateTime<Utc>) -> i64 {
    if session.is_submitted() {
        return 0;
    }
    (session.deadline - now).num_seconds().max(0)
}

fn ensure_writable(session: &AttemptSession, now: DateTime<Utc>) -> Result<(), AppError> {
    if session.is_submitted() {
        return Err(AppError::Conflict("attempt already submitted".to_string()));
    }
    if now >= session.deadline {
        return Err(AppError::SessionExpired {
            deadline: session.deadline,
        });
    }
    Ok(())
}

/// Sets or clears the selection for one question.
pub fn record_answer(
    session: &mut AttemptSession,
    question_id: &str,
    option_index: Option<usize>,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    ensure_writable(session, now)?;
    let slot = session.answers.get_mut(question_id).ok_or_else(|| {
        AppError::BadRequest(format!("question '{question_id}' is not part of this test"))
    })?;
    if *slot == option_index {
        return Ok(false);
    }
    *slot = option_index;
    Ok(true)
}

/// Moves the current position. Indexes past the end are clamped.
pub fn navigate(
    session: &mut AttemptSession,
    index: usize,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    ensure_writable(session, now)?;
    let last = session.question_order.len().saturating_sub(1);
    let index = index.min(last);
    if session.current_index == index {
        return Ok(false);
    }
    session.current_index = index;
    Ok(true)
}

/// Submits the session and grades it. A session past its deadline is closed
/// at the deadline, so late wall-clock time never counts as time taken.
/// Closing a submitted session changes nothing.
pub fn close(session: &mut AttemptSession, key: &AnswerKey, now: DateTime<Utc>) -> bool {
    if session.is_submitted() {
        return false;
    }
    let submitted_at = now.min(session.deadline);
    let time_taken = (submitted_at - session.started_at).num_seconds();

    session.result = Some(grader::grade(
        &session.id,
        &session.question_order,
        &session.answers,
        key,
        time_taken,
    ));
    session.submitted_at = Some(submitted_at);
    session.auto_submitted = now >= session.deadline;
    session.state = AttemptState::Submitted;
    true
}
