// src/engine/sampler.rs

use rand::{Rng, seq::SliceRandom};

use crate::{error::AppError, models::question::QuestionId};

/// Outcome of drawing questions from a candidate pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub question_ids: Vec<QuestionId>,
    pub requested: usize,
    /// The pool was smaller than `requested`; every candidate was taken.
    pub partial: bool,
}

/// Draws `min(count, candidates.len())` distinct ids in random order.
pub fn sample<R: Rng + ?Sized>(candidates: &[QuestionId], count: usize, rng: &mut R) -> Draw {
    let mut ids = candidates.to_vec();
    ids.shuffle(rng);
    let partial = ids.len() < count;
    ids.truncate(count);
    Draw {
        question_ids: ids,
        requested: count,
        partial,
    }
}

/// Applies the partial-fill policy. Strict callers get `InsufficientQuestions`,
/// tolerant callers get the smaller set and a warning in the log.
pub fn accept(draw: Draw, strict: bool) -> Result<Vec<QuestionId>, AppError> {
    if draw.question_ids.is_empty() || (draw.partial && strict) {
        return Err(AppError::InsufficientQuestions {
            requested: draw.requested,
            available: draw.question_ids.len(),
        });
    }
    if draw.partial {
        tracing::warn!(
            requested = draw.requested,
            available = draw.question_ids.len(),
            "partial fill: pool smaller than requested count"
        );
    }
    Ok(draw.question_ids)
}

/// A uniformly shuffled copy, used for per-session presentation order.
pub fn shuffled<R: Rng + ?Sized>(ids: &[QuestionId], rng: &mut R) -> Vec<QuestionId> {
    let mut out = ids.to_vec();
    out.shuffle(rng);
    out
}
