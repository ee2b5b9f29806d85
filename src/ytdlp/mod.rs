mod download;
mod probe;
pub mod select;
mod util;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;

pub use download::{DownloadRequest, DownloadedMedia};
pub use select::{FormatListing, StreamSelection, select_streams};

/// The two external-tool stages of an ingestion run.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn probe_formats(&self, url: &str) -> Result<FormatListing, AppError>;
    async fn download_merged(
        &self,
        request: &DownloadRequest<'_>,
    ) -> Result<DownloadedMedia, AppError>;
}

pub type DynMediaFetcher = Arc<dyn MediaFetcher>;

/// `yt-dlp` driven through its command line.
#[derive(Clone, Debug)]
pub struct YtDlp {
    bin: String,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn probe_formats(&self, url: &str) -> Result<FormatListing, AppError> {
        probe::probe_formats(&self.bin, url).await
    }

    async fn download_merged(
        &self,
        request: &DownloadRequest<'_>,
    ) -> Result<DownloadedMedia, AppError> {
        download::download_merged(&self.bin, request).await
    }
}
