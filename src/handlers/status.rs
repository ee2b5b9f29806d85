use axum::{
    Json,
    extract::{Path as AxumPath, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    queue::{JobStatusView, StatusQuery},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    /// Comma separated job ids; takes precedence over `filter`.
    pub ids: Option<String>,
    pub filter: Option<String>,
}

impl StatusParams {
    pub fn into_query(self) -> Result<StatusQuery, AppError> {
        if let Some(ids) = self.ids.filter(|ids| !ids.trim().is_empty()) {
            let ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(parse_job_id)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(StatusQuery::Ids(ids));
        }

        match self.filter.as_deref().map(str::trim) {
            None | Some("") | Some("recent") => Ok(StatusQuery::Recent),
            Some("active") => Ok(StatusQuery::Active),
            Some("error") | Some("errored") => Ok(StatusQuery::Errored),
            Some(other) => Err(AppError::validation(format!("unknown filter {other:?}"))),
        }
    }
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<Vec<JobStatusView>>, AppError> {
    let query = params.into_query()?;
    Ok(Json(state.queue.status(query).await?))
}

pub async fn job_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<JobStatusView>, AppError> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(state.queue.get(job_id).await?))
}

pub(super) fn parse_job_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation(format!("invalid job identifier {raw:?}")))
}
