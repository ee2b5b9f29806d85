use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    jobs::NewJob,
    queue::{ForceOutcome, JobStatusView},
    state::AppState,
};

use super::status::parse_job_id;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub source_url: String,
    pub category_id: String,
}

pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(payload): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<JobStatusView>), AppError> {
    let record = state
        .queue
        .enqueue(NewJob {
            source_url: payload.source_url,
            category_id: payload.category_id,
        })
        .await?;

    let view = state.queue.get(record.id).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

pub async fn force_process(State(state): State<AppState>) -> Result<Json<ForceOutcome>, AppError> {
    Ok(Json(state.queue.force_process().await?))
}

pub async fn delete_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, AppError> {
    let job_id = parse_job_id(&id)?;
    state.queue.delete(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
