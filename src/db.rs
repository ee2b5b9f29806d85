//! Postgres-backed job store and video catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{
    catalog::{NewVideo, VideoCatalog},
    error::AppError,
    jobs::{CompletedAsset, JobFilter, JobRecord, JobStatus, JobStore, NewJob, PersistedStatus},
};

const FOREIGN_KEY_VIOLATION: &str = "23503";

const JOB_COLUMNS: &str = "id, source_url, category_id, processing_status, error_message, \
     title, storage_url, thumbnail_url, video_id, created_at, updated_at";

/// Connects and applies the embedded migrations.
pub async fn init_pool(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| AppError::persistence(format!("migrations failed: {err}")))?;

    tracing::info!("database connected and migrations applied");
    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    source_url: String,
    category_id: String,
    processing_status: String,
    error_message: Option<String>,
    title: Option<String>,
    storage_url: Option<String>,
    thumbnail_url: Option<String>,
    video_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(JobRecord {
            id: row.id,
            source_url: row.source_url,
            category_id: row.category_id,
            status: PersistedStatus::parse(&row.processing_status)?.widen(),
            error_message: row.error_message,
            title: row.title,
            storage_url: row.storage_url,
            thumbnail_url: row.thumbnail_url,
            video_id: row.video_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<JobRow>) -> Result<Vec<JobRecord>, AppError> {
    rows.into_iter().map(JobRecord::try_from).collect()
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: NewJob) -> Result<JobRecord, AppError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO ingestion_jobs (id, source_url, category_id, processing_status)
             VALUES ($1, $2, $3, $4)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&job.source_url)
        .bind(&job.category_id)
        .bind(PersistedStatus::Waiting.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: &Uuid) -> Result<Option<JobRecord>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn claim_next_waiting(&self) -> Result<Option<JobRecord>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE ingestion_jobs
             SET processing_status = $1, error_message = NULL, updated_at = now()
             WHERE id = (
                 SELECT id FROM ingestion_jobs
                 WHERE processing_status = $2
                 ORDER BY seq
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(JobStatus::Downloading.persisted().as_str())
        .bind(PersistedStatus::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE ingestion_jobs
             SET processing_status = $2, error_message = $3, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.persisted().as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("job {id}")));
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, asset: &CompletedAsset) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE ingestion_jobs
             SET processing_status = $2, error_message = NULL, video_id = $3,
                 title = $4, storage_url = $5, thumbnail_url = $6, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Completed.persisted().as_str())
        .bind(asset.video_id)
        .bind(&asset.title)
        .bind(&asset.storage_url)
        .bind(&asset.thumbnail_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("job {id}")));
        }
        Ok(())
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<JobRecord>, AppError> {
        let rows = match filter {
            JobFilter::Ids(ids) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE id = ANY($1) ORDER BY seq"
                ))
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
            JobFilter::Active => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE processing_status = $1 ORDER BY seq"
                ))
                .bind(PersistedStatus::Processing.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            JobFilter::Errored => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE processing_status = $1 ORDER BY seq"
                ))
                .bind(PersistedStatus::Error.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            JobFilter::CreatedSince(cutoff) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE created_at >= $1 ORDER BY seq"
                ))
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?
            }
        };

        into_records(rows)
    }

    async fn count_waiting(&self) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ingestion_jobs WHERE processing_status = $1",
        )
        .bind(PersistedStatus::Waiting.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_active_since(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ingestion_jobs WHERE processing_status = $1 AND updated_at >= $2",
        )
        .bind(PersistedStatus::Processing.as_str())
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_idle(&self, id: &Uuid) -> Result<(), AppError> {
        let deleted = sqlx::query(
            "DELETE FROM ingestion_jobs WHERE id = $1 AND processing_status <> $2",
        )
        .bind(id)
        .bind(PersistedStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        if deleted.rows_affected() > 0 {
            return Ok(());
        }

        match self.get(id).await? {
            Some(_) => Err(AppError::busy(format!(
                "job {id} cannot be deleted while it is processing"
            ))),
            None => Err(AppError::not_found(format!("job {id}"))),
        }
    }

    async fn fail_stale(&self, message: &str, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE ingestion_jobs
             SET processing_status = $1, error_message = $2, updated_at = now()
             WHERE processing_status = $3 AND updated_at < $4",
        )
        .bind(PersistedStatus::Error.as_str())
        .bind(message)
        .bind(PersistedStatus::Processing.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgVideoCatalog {
    pool: PgPool,
}

impl PgVideoCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoCatalog for PgVideoCatalog {
    async fn insert_video(&self, video: NewVideo) -> Result<Uuid, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO videos (id, title, source_url, storage_url, thumbnail_url, category_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&video.title)
        .bind(&video.source_url)
        .bind(&video.storage_url)
        .bind(&video.thumbnail_url)
        .bind(&video.category_id)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(id) => {
                tx.commit().await?;
                tracing::debug!(%id, category = %video.category_id, "video row committed");
                Ok(id)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed insert also failed");
                }
                Err(map_insert_error(err, &video.category_id))
            }
        }
    }
}

fn map_insert_error(err: sqlx::Error, category_id: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return AppError::persistence(format!("unknown category {category_id}"));
        }
    }
    AppError::persistence(err.to_string())
}
