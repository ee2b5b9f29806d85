mod enqueue;
mod status;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub use enqueue::{EnqueueRequest, delete_job, enqueue_job, force_process};
pub use status::{StatusParams, job_status, list_jobs};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/jobs", post(enqueue_job).get(list_jobs))
        .route("/jobs/process", post(force_process))
        .route("/jobs/{id}", get(job_status).delete(delete_job))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
