// src/engine/grader.rs

use std::collections::BTreeMap;

use crate::{
    bank::AnswerKey,
    models::{
        attempt::{CategoryBreakdown, ScoredResult},
        question::QuestionId,
    },
};

#[derive(Default)]
struct Tally {
    correct: u32,
    wrong: u32,
    unanswered: u32,
}

impl Tally {
    fn total(&self) -> u32 {
        self.correct + self.wrong + self.unanswered
    }
}

/// Rounded share of `part` in `whole`, as a percentage. Zero when `whole` is zero.
pub fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) * 100.0 / f64::from(whole)).round() as u32
}

/// Scores an attempt.
///
/// Questions without a key entry (deleted from the bank) are counted as
/// `excluded` and left out of every denominator; their answers stay in the
/// session untouched. The output depends only on the inputs.
pub fn grade(
    attempt_id: &str,
    question_ids: &[QuestionId],
    answers: &BTreeMap<QuestionId, Option<usize>>,
    key: &AnswerKey,
    time_taken_seconds: i64,
) -> ScoredResult {
    let mut overall = Tally::default();
    let mut excluded = 0u32;
    let mut by_category: BTreeMap<&str, Tally> = BTreeMap::new();

    for q in question_ids {
        let Some(entry) = key.get(q) else {
            excluded += 1;
            continue;
        };
        let category = by_category.entry(entry.category_id.as_str()).or_default();

        match answers.get(q).copied().flatten() {
            None => {
                overall.unanswered += 1;
                category.unanswered += 1;
            }
            Some(selected) if selected == entry.correct_option_index => {
                overall.correct += 1;
                category.correct += 1;
            }
            Some(_) => {
                overall.wrong += 1;
                category.wrong += 1;
            }
        }
    }

    let per_category = by_category
        .into_iter()
        .map(|(category_id, t)| CategoryBreakdown {
            category_id: category_id.to_string(),
            correct: t.correct,
            wrong: t.wrong,
            unanswered: t.unanswered,
            total: t.total(),
            accuracy: percentage(t.correct, t.total()),
        })
        .collect();

    let total = overall.total();
    ScoredResult {
        attempt_id: attempt_id.to_string(),
        correct: overall.correct,
        wrong: overall.wrong,
        unanswered: overall.unanswered,
        total,
        excluded,
        percentage: percentage(overall.correct, total),
        time_taken_seconds: time_taken_seconds.max(0),
        per_category,
    }
}
