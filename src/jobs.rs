use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

/// Lifecycle of an ingestion job as the pipeline sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Downloading,
    Uploading,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Downloading | JobStatus::Uploading)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn description(self) -> &'static str {
        match self {
            JobStatus::Waiting => "Waiting in the queue",
            JobStatus::Downloading => "Downloading video from the source",
            JobStatus::Uploading => "Uploading video to storage",
            JobStatus::Completed => "Video is ready",
            JobStatus::Error => "Processing failed",
        }
    }

    /// Projection onto the stored vocabulary. Lossy: both active stages
    /// become `processing`, so a schema that admits finer values can widen
    /// this without touching the pipeline.
    pub fn persisted(self) -> PersistedStatus {
        match self {
            JobStatus::Waiting => PersistedStatus::Waiting,
            JobStatus::Downloading | JobStatus::Uploading => PersistedStatus::Processing,
            JobStatus::Completed => PersistedStatus::Completed,
            JobStatus::Error => PersistedStatus::Error,
        }
    }
}

/// Values admitted by the `processing_status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedStatus {
    Waiting,
    Processing,
    Completed,
    Error,
}

impl PersistedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistedStatus::Waiting => "waiting",
            PersistedStatus::Processing => "processing",
            PersistedStatus::Completed => "completed",
            PersistedStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "waiting" => Ok(PersistedStatus::Waiting),
            "processing" => Ok(PersistedStatus::Processing),
            "completed" => Ok(PersistedStatus::Completed),
            "error" => Ok(PersistedStatus::Error),
            other => Err(AppError::persistence(format!(
                "unknown processing status {other:?}"
            ))),
        }
    }

    /// `processing` cannot tell which stage it was in; it reads back as
    /// `Downloading` and the coordinator overlays the live stage when it has one.
    pub fn widen(self) -> JobStatus {
        match self {
            PersistedStatus::Waiting => JobStatus::Waiting,
            PersistedStatus::Processing => JobStatus::Downloading,
            PersistedStatus::Completed => JobStatus::Completed,
            PersistedStatus::Error => JobStatus::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub source_url: String,
    pub category_id: String,
}

/// Fields filled in once a job has gone through the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAsset {
    pub video_id: Uuid,
    pub title: String,
    pub storage_url: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub source_url: String,
    pub category_id: String,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub title: Option<String>,
    pub storage_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum JobFilter {
    Ids(Vec<Uuid>),
    Active,
    Errored,
    CreatedSince(DateTime<Utc>),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: NewJob) -> Result<JobRecord, AppError>;
    async fn get(&self, id: &Uuid) -> Result<Option<JobRecord>, AppError>;
    /// Oldest waiting job, moved to `Downloading` in the same atomic step.
    async fn claim_next_waiting(&self) -> Result<Option<JobRecord>, AppError>;
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), AppError>;
    async fn complete(&self, id: Uuid, asset: &CompletedAsset) -> Result<(), AppError>;
    /// Oldest first.
    async fn list(&self, filter: JobFilter) -> Result<Vec<JobRecord>, AppError>;
    async fn count_waiting(&self) -> Result<u64, AppError>;
    async fn count_active_since(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
    /// Refuses rows that are currently active.
    async fn delete_idle(&self, id: &Uuid) -> Result<(), AppError>;
    /// Moves active rows last touched before `cutoff` to `Error`, returning
    /// how many were touched. Rows updated since then may belong to another
    /// live process and are left alone.
    async fn fail_stale(&self, message: &str, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

pub type DynJobStore = Arc<dyn JobStore>;

#[derive(Clone, Default)]
pub struct LocalJobStore {
    inner: Arc<Mutex<LocalJobs>>,
}

#[derive(Default)]
struct LocalJobs {
    next_seq: u64,
    records: HashMap<Uuid, (u64, JobRecord)>,
}

impl LocalJobs {
    fn ordered(&self) -> Vec<&JobRecord> {
        let mut rows: Vec<_> = self.records.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, record)| record).collect()
    }
}

impl LocalJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for LocalJobStore {
    async fn create_job(&self, job: NewJob) -> Result<JobRecord, AppError> {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            source_url: job.source_url,
            category_id: job.category_id,
            status: JobStatus::Waiting,
            error_message: None,
            title: None,
            storage_url: None,
            thumbnail_url: None,
            video_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut guard = self.inner.lock().await;
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.records.insert(record.id, (seq, record.clone()));
        Ok(record)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<JobRecord>, AppError> {
        let guard = self.inner.lock().await;
        Ok(guard.records.get(id).map(|(_, record)| record.clone()))
    }

    async fn claim_next_waiting(&self) -> Result<Option<JobRecord>, AppError> {
        let mut guard = self.inner.lock().await;
        let next = guard
            .records
            .values_mut()
            .filter(|(_, record)| record.status == JobStatus::Waiting)
            .min_by_key(|(seq, _)| *seq);

        Ok(next.map(|(_, record)| {
            record.status = JobStatus::Downloading;
            record.error_message = None;
            record.updated_at = Utc::now();
            record.clone()
        }))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), AppError> {
        let mut guard = self.inner.lock().await;
        let (_, record) = guard
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("job {id}")))?;
        record.status = status;
        record.error_message = error_message;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn complete(&self, id: Uuid, asset: &CompletedAsset) -> Result<(), AppError> {
        let mut guard = self.inner.lock().await;
        let (_, record) = guard
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("job {id}")))?;
        record.status = JobStatus::Completed;
        record.error_message = None;
        record.video_id = Some(asset.video_id);
        record.title = Some(asset.title.clone());
        record.storage_url = Some(asset.storage_url.clone());
        record.thumbnail_url = asset.thumbnail_url.clone();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<JobRecord>, AppError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .ordered()
            .into_iter()
            .filter(|record| match &filter {
                JobFilter::Ids(ids) => ids.contains(&record.id),
                JobFilter::Active => record.status.is_active(),
                JobFilter::Errored => record.status == JobStatus::Error,
                JobFilter::CreatedSince(cutoff) => record.created_at >= *cutoff,
            })
            .cloned()
            .collect())
    }

    async fn count_waiting(&self) -> Result<u64, AppError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .records
            .values()
            .filter(|(_, record)| record.status == JobStatus::Waiting)
            .count() as u64)
    }

    async fn count_active_since(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .records
            .values()
            .filter(|(_, record)| record.status.is_active() && record.updated_at >= cutoff)
            .count() as u64)
    }

    async fn delete_idle(&self, id: &Uuid) -> Result<(), AppError> {
        let mut guard = self.inner.lock().await;
        let status = guard.records.get(id).map(|(_, record)| record.status);
        match status {
            None => Err(AppError::not_found(format!("job {id}"))),
            Some(status) if status.is_active() => Err(AppError::busy(format!(
                "job {id} cannot be deleted while it is {}",
                status.persisted().as_str()
            ))),
            Some(_) => {
                guard.records.remove(id);
                Ok(())
            }
        }
    }

    async fn fail_stale(&self, message: &str, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();
        let mut touched = 0;
        for (_, record) in guard.records.values_mut() {
            if record.status.is_active() && record.updated_at < cutoff {
                record.status = JobStatus::Error;
                record.error_message = Some(message.to_string());
                record.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }
}
