use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    blob::BlobStore,
    catalog::{DynVideoCatalog, NewVideo},
    config::CapacityConfig,
    error::AppError,
    jobs::{CompletedAsset, JobRecord, JobStatus},
    workspace::{self, Workspace},
    ytdlp::{DownloadRequest, DynMediaFetcher, select_streams},
};

/// Receives the stage changes of a running job.
#[async_trait]
pub trait StageSink: Send + Sync {
    async fn enter(&self, id: Uuid, stage: JobStatus) -> Result<(), AppError>;
}

/// Probe → select → download → upload → persist for a single job.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: DynMediaFetcher,
    blobs: BlobStore,
    catalog: DynVideoCatalog,
    workspace: Workspace,
    capacity: CapacityConfig,
}

impl Pipeline {
    pub fn new(
        fetcher: DynMediaFetcher,
        blobs: BlobStore,
        catalog: DynVideoCatalog,
        workspace: Workspace,
        capacity: CapacityConfig,
    ) -> Self {
        Self {
            fetcher,
            blobs,
            catalog,
            workspace,
            capacity,
        }
    }

    /// The job is expected to be in `Downloading` already. Whatever happens,
    /// the job's download directory, partial files included, does not
    /// outlive the run.
    pub async fn run(&self, job: &JobRecord, sink: &dyn StageSink) -> Result<CompletedAsset, AppError> {
        let job_dir = self.workspace.job_dir(job.id);
        let result = self.run_stages(job, sink, &job_dir).await;
        discard_local(job.id, &job_dir).await;
        result
    }

    async fn run_stages(
        &self,
        job: &JobRecord,
        sink: &dyn StageSink,
        job_dir: &Path,
    ) -> Result<CompletedAsset, AppError> {
        let id = job.id;
        let url = job.source_url.as_str();

        self.blobs.ensure_available().await?;
        self.workspace.prepare().await?;
        self.workspace.ensure_capacity(&self.capacity).await?;

        let listing = self.fetcher.probe_formats(url).await?;
        let (audio_stream_id, video_stream_id) = select_streams(&listing).require()?;
        tracing::debug!(%id, audio = %audio_stream_id, video = %video_stream_id, "streams selected");

        let request = DownloadRequest {
            url,
            output_dir: job_dir,
            video_stream_id: &video_stream_id,
            audio_stream_id: &audio_stream_id,
        };
        let media = self.fetcher.download_merged(&request).await?;

        sink.enter(id, JobStatus::Uploading).await?;
        let storage_url = self.blobs.upload(&media.path).await?;

        let video_id = self
            .catalog
            .insert_video(NewVideo {
                title: media.title.clone(),
                source_url: job.source_url.clone(),
                storage_url: storage_url.clone(),
                thumbnail_url: media.thumbnail_url.clone(),
                category_id: job.category_id.clone(),
            })
            .await?;

        tracing::info!(%id, %video_id, %storage_url, "ingestion persisted");

        Ok(CompletedAsset {
            video_id,
            title: media.title.clone(),
            storage_url,
            thumbnail_url: media.thumbnail_url.clone(),
        })
    }
}

async fn discard_local(id: Uuid, job_dir: &Path) {
    match workspace::remove_dir(job_dir).await {
        Ok(true) => tracing::debug!(%id, dir = %job_dir.display(), "local downloads removed"),
        Ok(false) => {}
        Err(err) => tracing::warn!(%id, dir = %job_dir.display(), error = %err, "cleanup failed"),
    }
}
