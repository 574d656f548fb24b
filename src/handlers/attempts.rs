// src/handlers/attempts.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    engine::AssessmentEngine,
    error::AppError,
    models::attempt::{NavigateRequest, SubmitAnswerRequest},
    utils::jwt::Claims,
};

/// The caller's paper: session state plus questions in their presentation
/// order, without the answer key. A session past its deadline comes back
/// submitted.
pub async fn get_paper(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.get_paper(&id, claims.user_id()).await?))
}

/// Records one answer. `option_index: null` clears it.
///
/// Answers arriving after the deadline are refused with `410 Gone` and the
/// session is submitted with what it had.
pub async fn submit_answer(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = match req.option_index {
        Some(index) => {
            engine
                .submit_answer(&id, claims.user_id(), &req.question_id, Some(index))
                .await?
        }
        None => {
            engine
                .clear_answer(&id, claims.user_id(), &req.question_id)
                .await?
        }
    };
    Ok(Json(session))
}

pub async fn navigate(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<NavigateRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.navigate(&id, claims.user_id(), req.index).await?))
}

/// Submits the attempt and returns its score.
/// Submitting again returns the same result.
pub async fn submit_attempt(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.submit_attempt(&id, claims.user_id()).await?))
}

/// The result as far as the release gate allows.
pub async fn view_result(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.view_result(&id, claims.user_id()).await?))
}

pub async fn solutions(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.solutions(&id, claims.user_id()).await?))
}

/// Whether the caller may see this attempt's score right now.
pub async fn visibility(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = engine.get_session(&id, claims.user_id()).await?;
    let visible = engine
        .can_view_result(&session.test_id, &session.id, engine.now())
        .await?;
    Ok(Json(json!({ "attempt_id": session.id, "visible": visible })))
}
