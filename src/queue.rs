//! Serial processing of ingestion jobs.
//!
//! One coordinator is built at startup and shared through [`AppState`].
//! It drains the `waiting` backlog one job at a time: claim the oldest job,
//! run the pipeline in its own task, record the outcome, claim the next.
//! The registry of in-flight runs only lives in memory; the job store stays
//! the source of truth across restarts.
//!
//! [`AppState`]: crate::state::AppState

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::{AbortHandle, JoinHandle},
};
use url::Url;
use uuid::Uuid;

use crate::{
    error::AppError,
    jobs::{DynJobStore, JobFilter, JobRecord, JobStatus, NewJob},
    pipeline::{Pipeline, StageSink},
};

pub const INTERRUPTED_MESSAGE: &str = "processing interrupted by a server restart";
pub const ABANDONED_MESSAGE: &str = "processing abandoned, no progress within the stale window";
const RECENT_WINDOW_HOURS: i64 = 24;

struct InFlight {
    stage: JobStatus,
    started_at: DateTime<Utc>,
    handle: AbortHandle,
}

#[derive(Debug, Clone)]
pub enum StatusQuery {
    Ids(Vec<Uuid>),
    Active,
    Errored,
    Recent,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: Uuid,
    pub source_url: String,
    pub category_id: String,
    pub status: JobStatus,
    pub description: String,
    pub elapsed: String,
    pub error_message: Option<String>,
    pub title: Option<String>,
    pub storage_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub running_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForceOutcome {
    /// Drains started by this call, 0 or 1.
    pub started: u32,
    pub queued: u64,
}

pub struct QueueCoordinator {
    jobs: DynJobStore,
    pipeline: Pipeline,
    stale_after: Duration,
    registry: Mutex<HashMap<Uuid, InFlight>>,
    draining: AtomicBool,
}

impl QueueCoordinator {
    pub fn new(jobs: DynJobStore, pipeline: Pipeline, stale_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            jobs,
            pipeline,
            stale_after,
            registry: Mutex::new(HashMap::new()),
            draining: AtomicBool::new(false),
        })
    }

    pub async fn enqueue(self: &Arc<Self>, job: NewJob) -> Result<JobRecord, AppError> {
        let url = Url::parse(job.source_url.trim())
            .map_err(|err| AppError::validation(format!("invalid url: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::validation(format!(
                "unsupported url scheme {}",
                url.scheme()
            )));
        }
        let category_id = job.category_id.trim().to_string();
        if category_id.is_empty() {
            return Err(AppError::validation("category_id must not be empty"));
        }

        let record = self
            .jobs
            .create_job(NewJob {
                source_url: url.into(),
                category_id,
            })
            .await?;
        tracing::info!(id = %record.id, url = %record.source_url, "job enqueued");

        self.start_next();
        Ok(record)
    }

    /// Starts draining the backlog unless a drain is already running.
    /// Returns the drain task, which ends once no waiting job is left.
    pub fn start_next(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.try_begin_drain() {
            return None;
        }

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.drain().await }))
    }

    pub async fn force_process(self: &Arc<Self>) -> Result<ForceOutcome, AppError> {
        if !self.is_draining() && self.in_flight().await == 0 {
            let abandoned = self
                .jobs
                .fail_stale(ABANDONED_MESSAGE, self.stale_cutoff()?)
                .await?;
            if abandoned > 0 {
                tracing::warn!(abandoned, "stale active jobs marked as failed");
            }
        }

        let queued = self.jobs.count_waiting().await?;

        if self.is_busy().await? {
            tracing::debug!(queued, "forced drain skipped, a job is already active");
            return Ok(ForceOutcome { started: 0, queued });
        }
        if queued == 0 {
            return Ok(ForceOutcome { started: 0, queued });
        }

        let started = u32::from(self.start_next().is_some());
        tracing::info!(queued, started, "forced drain requested");
        Ok(ForceOutcome { started, queued })
    }

    pub async fn status(&self, query: StatusQuery) -> Result<Vec<JobStatusView>, AppError> {
        let records = match query {
            StatusQuery::Ids(ids) => {
                let found = self.jobs.list(JobFilter::Ids(ids.clone())).await?;
                let by_id: HashMap<Uuid, JobRecord> =
                    found.into_iter().map(|record| (record.id, record)).collect();

                let missing: Vec<String> = ids
                    .iter()
                    .filter(|id| !by_id.contains_key(*id))
                    .map(Uuid::to_string)
                    .collect();
                if !missing.is_empty() {
                    return Err(AppError::not_found(format!("jobs {}", missing.join(", "))));
                }

                ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
            }
            StatusQuery::Active => self.jobs.list(JobFilter::Active).await?,
            StatusQuery::Errored => self.jobs.list(JobFilter::Errored).await?,
            StatusQuery::Recent => {
                let cutoff = Utc::now() - chrono::Duration::hours(RECENT_WINDOW_HOURS);
                self.jobs.list(JobFilter::CreatedSince(cutoff)).await?
            }
        };

        let registry = self.registry.lock().await;
        let now = Utc::now();
        Ok(records
            .into_iter()
            .map(|record| {
                let live = registry.get(&record.id);
                view(record, live, now)
            })
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<JobStatusView, AppError> {
        self.status(StatusQuery::Ids(vec![id]))
            .await?
            .pop()
            .ok_or_else(|| AppError::not_found(format!("job {id}")))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(live) = self.registry.lock().await.get(&id) {
            return Err(AppError::busy(format!(
                "job {id} cannot be deleted while {}",
                live.stage.description().to_lowercase()
            )));
        }
        self.jobs.delete_idle(&id).await?;
        tracing::info!(%id, "job deleted");
        Ok(())
    }

    /// Marks jobs that a previous process left active as failed. Only rows
    /// untouched for longer than the stale window are affected, fresher ones
    /// may still be running in another process. Only meaningful before the
    /// first drain of this process has started.
    pub async fn recover_interrupted(&self) -> Result<u64, AppError> {
        if self.draining.load(Ordering::Acquire) || !self.registry.lock().await.is_empty() {
            tracing::warn!("recovery skipped, this process is already draining");
            return Ok(0);
        }

        let recovered = self
            .jobs
            .fail_stale(INTERRUPTED_MESSAGE, self.stale_cutoff()?)
            .await?;
        if recovered > 0 {
            tracing::warn!(recovered, "jobs left active by a previous process marked as failed");
        }
        Ok(recovered)
    }

    pub async fn in_flight(&self) -> usize {
        self.registry
            .lock()
            .await
            .values()
            .filter(|live| !live.handle.is_finished())
            .count()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    async fn is_busy(&self) -> Result<bool, AppError> {
        if self.is_draining() || self.in_flight().await > 0 {
            return Ok(true);
        }

        let active = self.jobs.count_active_since(self.stale_cutoff()?).await?;
        Ok(active > 0)
    }

    /// Active rows last updated before this instant are considered abandoned.
    fn stale_cutoff(&self) -> Result<DateTime<Utc>, AppError> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .map_err(|err| AppError::internal(format!("stale window out of range: {err}")))?;
        Ok(Utc::now() - stale_after)
    }

    fn try_begin_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn drain(self: Arc<Self>) {
        loop {
            while let Some(job) = self.claim_next().await {
                self.process(job).await;
            }

            self.draining.store(false, Ordering::Release);

            // A job enqueued after the last claim but before the flag was
            // cleared would otherwise wait for the next trigger.
            match self.jobs.count_waiting().await {
                Ok(0) => return,
                Ok(_) if self.try_begin_drain() => continue,
                Ok(_) => return,
                Err(err) => {
                    tracing::error!(error = %err, "could not re-check the backlog");
                    return;
                }
            }
        }
    }

    async fn claim_next(&self) -> Option<JobRecord> {
        match self.jobs.claim_next_waiting().await {
            Ok(job) => job,
            Err(err) => {
                tracing::error!(error = %err, "failed to claim next job");
                None
            }
        }
    }

    async fn process(self: &Arc<Self>, job: JobRecord) {
        let id = job.id;
        tracing::info!(%id, url = %job.source_url, "job started");

        let handle = {
            let mut registry = self.registry.lock().await;
            let this = Arc::clone(self);
            let handle = tokio::spawn(async move { this.pipeline.run(&job, this.as_ref()).await });
            registry.insert(
                id,
                InFlight {
                    stage: JobStatus::Downloading,
                    started_at: Utc::now(),
                    handle: handle.abort_handle(),
                },
            );
            handle
        };

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(AppError::internal(format!("ingestion task ended abnormally: {err}"))),
        };

        let recorded = match outcome {
            Ok(asset) => {
                tracing::info!(%id, storage_url = %asset.storage_url, "job completed");
                self.jobs.complete(id, &asset).await
            }
            Err(err) => {
                tracing::error!(%id, error = %err, "job failed");
                self.jobs
                    .update_status(id, JobStatus::Error, Some(err.to_string()))
                    .await
            }
        };
        if let Err(err) = recorded {
            tracing::error!(%id, error = %err, "failed to record job outcome");
        }

        self.registry.lock().await.remove(&id);
    }
}

#[async_trait]
impl StageSink for QueueCoordinator {
    async fn enter(&self, id: Uuid, stage: JobStatus) -> Result<(), AppError> {
        self.jobs.update_status(id, stage, None).await?;
        if let Some(live) = self.registry.lock().await.get_mut(&id) {
            live.stage = stage;
        }
        tracing::debug!(%id, ?stage, "job stage changed");
        Ok(())
    }
}

fn view(record: JobRecord, live: Option<&InFlight>, now: DateTime<Utc>) -> JobStatusView {
    let status = live.map(|live| live.stage).unwrap_or(record.status);
    let finished_at = if status.is_terminal() {
        record.updated_at
    } else {
        now
    };

    JobStatusView {
        id: record.id,
        source_url: record.source_url,
        category_id: record.category_id,
        status,
        description: status.description().to_string(),
        elapsed: format_elapsed(finished_at - record.created_at),
        error_message: record.error_message,
        title: record.title,
        storage_url: record.storage_url,
        thumbnail_url: record.thumbnail_url,
        video_id: record.video_id,
        created_at: record.created_at,
        running_since: live.map(|live| live.started_at),
    }
}

pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60,
    );

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
