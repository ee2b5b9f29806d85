#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use object_store::{RetryConfig, aws::AmazonS3Builder, memory::InMemory};
use tempfile::TempDir;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;
use vingest::{
    blob::BlobStore,
    catalog::{LocalVideoCatalog, NewVideo, VideoCatalog},
    config::CapacityConfig,
    error::AppError,
    jobs::{JobFilter, JobStore, LocalJobStore},
    pipeline::Pipeline,
    queue::QueueCoordinator,
    workspace::Workspace,
    ytdlp::{DownloadRequest, DownloadedMedia, DynMediaFetcher, FormatListing, MediaFetcher},
};

pub const CATEGORY: &str = "cat-1";

pub const PORTUGUESE_LISTING: &str = "\
[info] Available formats for x:
ID  EXT  RESOLUTION |  VCODEC        ACODEC     MORE INFO
----------------------------------------------------------
139 m4a  audio only | audio only     mp4a.40.5  [en] low, m4a_dash
140 m4a  audio only | audio only     mp4a.40.2  [pt] medium, m4a_dash
136 mp4  1280x720   | avc1.4d401f    video only 720p, mp4_dash
299 mp4  1920x1080  | avc1.64002a    video only 1080p60, mp4_dash
";

pub const ENGLISH_ONLY_LISTING: &str = "\
139 m4a  audio only | audio only     mp4a.40.5  [en] low, m4a_dash
299 mp4  1920x1080  | avc1.64002a    video only 1080p60, mp4_dash
";

/// Stands in for yt-dlp: serves a fixed listing and writes a small file per download.
pub struct FakeFetcher {
    listing: Mutex<String>,
    jobs: Arc<LocalJobStore>,
    gate: Option<Arc<Semaphore>>,
    fail_download: bool,
    pub listings: AtomicUsize,
    pub downloads: Mutex<Vec<(String, String, String)>>,
    pub max_active_seen: AtomicUsize,
    pub produced: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    pub fn new(listing: &str, jobs: Arc<LocalJobStore>) -> Self {
        Self {
            listing: Mutex::new(listing.to_string()),
            jobs,
            gate: None,
            fail_download: false,
            listings: AtomicUsize::new(0),
            downloads: Mutex::new(Vec::new()),
            max_active_seen: AtomicUsize::new(0),
            produced: Mutex::new(Vec::new()),
        }
    }

    /// Downloads block until the semaphore hands out a permit.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub async fn set_listing(&self, listing: &str) {
        *self.listing.lock().await = listing.to_string();
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn probe_formats(&self, _url: &str) -> Result<FormatListing, AppError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(FormatListing::from_output(&self.listing.lock().await))
    }

    async fn download_merged(
        &self,
        request: &DownloadRequest<'_>,
    ) -> Result<DownloadedMedia, AppError> {
        let active = self.jobs.list(JobFilter::Active).await?.len();
        self.max_active_seen.fetch_max(active, Ordering::SeqCst);

        let call = {
            let mut downloads = self.downloads.lock().await;
            downloads.push((
                request.url.to_string(),
                request.video_stream_id.to_string(),
                request.audio_stream_id.to_string(),
            ));
            downloads.len()
        };

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|err| AppError::internal(err.to_string()))?;
            permit.forget();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.fail_download {
            return Err(AppError::external_tool("yt-dlp exited with status 1: HTTP Error 403"));
        }

        tokio::fs::create_dir_all(request.output_dir).await?;
        let path = request.output_dir.join(format!("Video_{call}.mp4"));
        tokio::fs::write(&path, b"merged media").await?;
        self.produced.lock().await.push(path.clone());

        Ok(DownloadedMedia {
            path,
            title: format!("Vídeo {call}"),
            thumbnail_url: Some(format!("https://i.ytimg.com/vi/{call}/hq.jpg")),
        })
    }
}

/// Holds every insert until the semaphore hands out a permit.
pub struct GatedCatalog {
    inner: LocalVideoCatalog,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl VideoCatalog for GatedCatalog {
    async fn insert_video(&self, video: NewVideo) -> Result<Uuid, AppError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| AppError::internal(err.to_string()))?;
        permit.forget();
        self.inner.insert_video(video).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub workspace: Workspace,
    pub jobs: Arc<LocalJobStore>,
    pub catalog: LocalVideoCatalog,
    pub fetcher: Arc<FakeFetcher>,
    pub blobs: BlobStore,
    pub queue: Arc<QueueCoordinator>,
}

pub struct HarnessBuilder {
    listing: String,
    gate: Option<Arc<Semaphore>>,
    catalog_gate: Option<Arc<Semaphore>>,
    fetcher: Option<DynMediaFetcher>,
    stale_after: Duration,
    failing_downloads: bool,
    unreachable_storage: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            listing: PORTUGUESE_LISTING.to_string(),
            gate: None,
            catalog_gate: None,
            fetcher: None,
            stale_after: Duration::from_secs(6 * 3600),
            failing_downloads: false,
            unreachable_storage: false,
        }
    }

    /// Video rows are only written once the semaphore hands out a permit.
    pub fn catalog_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.catalog_gate = Some(gate);
        self
    }

    /// Runs the pipeline against this fetcher instead of the fake one.
    pub fn fetcher(mut self, fetcher: DynMediaFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn listing(mut self, listing: &str) -> Self {
        self.listing = listing.to_string();
        self
    }

    pub fn gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.failing_downloads = true;
        self
    }

    pub fn unreachable_storage(mut self) -> Self {
        self.unreachable_storage = true;
        self
    }

    pub async fn build(self) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::initialize(dir.path().join("work"))
            .await
            .expect("workspace");
        let jobs = Arc::new(LocalJobStore::new());
        let catalog = LocalVideoCatalog::with_categories([CATEGORY]);

        let mut fetcher = FakeFetcher::new(&self.listing, jobs.clone());
        if let Some(gate) = self.gate {
            fetcher = fetcher.gated(gate);
        }
        if self.failing_downloads {
            fetcher = fetcher.failing_downloads();
        }
        let fetcher = Arc::new(fetcher);

        let blobs = if self.unreachable_storage {
            unreachable_blob_store()
        } else {
            BlobStore::new(Arc::new(InMemory::new()), "videos", "https://cdn.example.com")
        };

        let pipeline_catalog: Arc<dyn VideoCatalog> = match self.catalog_gate {
            Some(gate) => Arc::new(GatedCatalog {
                inner: catalog.clone(),
                gate,
            }) as Arc<dyn VideoCatalog>,
            None => Arc::new(catalog.clone()) as Arc<dyn VideoCatalog>,
        };
        let pipeline_fetcher: DynMediaFetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => fetcher.clone() as DynMediaFetcher,
        };

        let pipeline = Pipeline::new(
            pipeline_fetcher,
            blobs.clone(),
            pipeline_catalog,
            workspace.clone(),
            CapacityConfig::disabled(),
        );
        let queue = QueueCoordinator::new(jobs.clone(), pipeline, self.stale_after);

        Harness {
            dir,
            workspace,
            jobs,
            catalog,
            fetcher,
            blobs,
            queue,
        }
    }
}

/// An S3 endpoint nobody listens on, with retries disabled so it fails fast.
pub fn unreachable_blob_store() -> BlobStore {
    let store = AmazonS3Builder::new()
        .with_bucket_name("missing-bucket")
        .with_region("us-east-1")
        .with_endpoint("http://127.0.0.1:1")
        .with_allow_http(true)
        .with_access_key_id("test")
        .with_secret_access_key("test")
        .with_retry(RetryConfig {
            max_retries: 0,
            retry_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .build()
        .expect("s3 builder");
    BlobStore::new(Arc::new(store), "videos", "http://127.0.0.1:1/missing-bucket")
}

pub async fn wait_until_idle(queue: &QueueCoordinator) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while queue.is_draining() || queue.in_flight().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue did not become idle");
}

pub async fn wait_for_downloads(fetcher: &FakeFetcher, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while fetcher.downloads.lock().await.len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("downloads did not start");
}

/// Writes an executable shell script standing in for yt-dlp.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::{io::Write, os::unix::fs::PermissionsExt};

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).expect("create script");
        file.write_all(format!("#!/bin/sh\n{body}").as_bytes())
            .expect("write script");
        file.sync_all().expect("sync script");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Entries left under a directory, empty when it does not exist.
pub fn leftover_entries(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
