// src/handlers/scopes.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{engine::AssessmentEngine, error::AppError, utils::jwt::Claims};

/// Lists the tests of a scope with their current lifecycle state.
pub async fn list_tests(
    State(engine): State<Arc<AssessmentEngine>>,
    Path(scope_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.list_tests(&scope_id).await?))
}

/// Today's auto-test for the caller.
///
/// The first request inside the daily window materializes the slot; later
/// requests on the same day get the same test. `completed_today` tells the
/// client whether the caller already submitted a slot of this scope today.
pub async fn daily_slot(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(scope_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.daily_slot(&scope_id, claims.user_id()).await?))
}

pub async fn get_auto_test(
    State(engine): State<Arc<AssessmentEngine>>,
    Path(scope_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let config = engine
        .get_auto_config(&scope_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No auto-test configured for {}", scope_id)))?;
    Ok(Json(config))
}
