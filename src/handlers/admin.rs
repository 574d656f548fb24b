// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    bank::StoreQuestionBank,
    engine::AssessmentEngine,
    error::AppError,
    models::{
        auto_test::AutoTestConfig,
        question::{CreateQuestionRequest, QuestionRecord},
        test_definition::{CreateTestRequest, RenameTestRequest},
    },
    utils::jwt::Claims,
};

/// Imports a batch of questions into the bank.
/// Admin only.
///
/// * Validates every question before writing any of them.
/// * Existing ids are overwritten; tests keep their frozen id lists.
pub async fn import_questions(
    State(bank): State<Arc<StoreQuestionBank>>,
    Json(payload): Json<Vec<CreateQuestionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest("No questions supplied".to_string()));
    }
    for (i, q) in payload.iter().enumerate() {
        q.validate()
            .map_err(|e| AppError::BadRequest(format!("question #{i}: {e}")))?;
    }

    let records: Vec<QuestionRecord> = payload
        .into_iter()
        .map(CreateQuestionRequest::into_record)
        .collect();
    let imported = bank.import(&records).await?;

    Ok((StatusCode::CREATED, Json(json!({ "imported": imported }))))
}

/// Removes a question from the bank.
/// Admin only. Tests that reference it grade around the gap.
pub async fn delete_question(
    State(bank): State<Arc<StoreQuestionBank>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !bank.delete(&id).await? {
        return Err(AppError::NotFound(format!("Question {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Creates a test in a scope and freezes its question list.
/// Admin only.
pub async fn create_test(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(scope_id): Path<String>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let test = engine
        .create_test(&scope_id, claims.user_id(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(test)))
}

/// Renames a test. Admin only.
pub async fn rename_test(
    State(engine): State<Arc<AssessmentEngine>>,
    Path(id): Path<String>,
    Json(payload): Json<RenameTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let test = engine.rename_test(&id, &payload.title).await?;
    Ok(Json(test))
}

/// Saves the scope's daily auto-test configuration. Admin only.
pub async fn put_auto_test(
    State(engine): State<Arc<AssessmentEngine>>,
    Path(scope_id): Path<String>,
    Json(payload): Json<AutoTestConfig>,
) -> Result<impl IntoResponse, AppError> {
    let saved = engine.put_auto_config(&scope_id, payload).await?;
    Ok(Json(saved))
}
