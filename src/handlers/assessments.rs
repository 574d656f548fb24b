// src/handlers/assessments.rs

use std::{convert::Infallible, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, stream};
use serde_json::json;

use crate::{
    engine::AssessmentEngine,
    error::AppError,
    models::attempt::AttemptStart,
    utils::jwt::Claims,
};

pub async fn get_test(
    State(engine): State<Arc<AssessmentEngine>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.test_view(&id).await?))
}

/// Starts (or resumes) the caller's attempt.
///
/// * `201 Created` with outcome `started` for a fresh session.
/// * `200 OK` with outcome `resumed` or `already_submitted` otherwise; the
///   existing session is returned either way.
pub async fn start_attempt(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = engine
        .start_attempt(&id, claims.user_id(), claims.display_name())
        .await?;
    let status = match outcome {
        AttemptStart::Started(_) => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Leaderboard of a test as the caller may see it.
pub async fn get_leaderboard(
    State(engine): State<Arc<AssessmentEngine>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.get_leaderboard(&id, claims.user_id()).await?))
}

/// Server-sent `attempt` events for a test.
///
/// Events only carry the session id and revision. Clients re-read the
/// leaderboard on each one, so visibility rules stay server-side.
pub async fn events(
    State(engine): State<Arc<AssessmentEngine>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // 404 before opening a stream that would never emit.
    engine.get_test(&id).await?;

    let subscription = engine.subscribe_attempts(&id);
    let events = stream::unfold(subscription, |mut sub| async move {
        let change = sub.next().await?;
        let event = Event::default()
            .event("attempt")
            .data(json!({ "id": change.id, "revision": change.revision }).to_string());
        Some((Ok(event), sub))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
