use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

/// Row describing a finished ingestion, written once per successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideo {
    pub title: String,
    pub source_url: String,
    pub storage_url: String,
    pub thumbnail_url: Option<String>,
    pub category_id: String,
}

#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Inserts atomically; on failure nothing is left behind.
    async fn insert_video(&self, video: NewVideo) -> Result<Uuid, AppError>;
}

pub type DynVideoCatalog = Arc<dyn VideoCatalog>;

/// In-memory catalog enforcing the category reference the way the database does.
#[derive(Clone, Default)]
pub struct LocalVideoCatalog {
    inner: Arc<Mutex<LocalCatalog>>,
}

#[derive(Default)]
struct LocalCatalog {
    categories: HashSet<String>,
    videos: HashMap<Uuid, NewVideo>,
}

impl LocalVideoCatalog {
    pub fn with_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(Mutex::new(LocalCatalog {
                categories: categories.into_iter().map(Into::into).collect(),
                videos: HashMap::new(),
            })),
        }
    }

    pub async fn add_category(&self, id: impl Into<String>) {
        self.inner.lock().await.categories.insert(id.into());
    }

    pub async fn get(&self, id: &Uuid) -> Option<NewVideo> {
        self.inner.lock().await.videos.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.videos.len()
    }
}

#[async_trait]
impl VideoCatalog for LocalVideoCatalog {
    async fn insert_video(&self, video: NewVideo) -> Result<Uuid, AppError> {
        let mut guard = self.inner.lock().await;
        if !guard.categories.contains(&video.category_id) {
            return Err(AppError::persistence(format!(
                "unknown category {}",
                video.category_id
            )));
        }

        let id = Uuid::new_v4();
        guard.videos.insert(id, video);
        Ok(id)
    }
}
