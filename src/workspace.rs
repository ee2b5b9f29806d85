use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use fs2::{available_space, total_space};
use tokio::{fs, task};
use uuid::Uuid;

use crate::{config::CapacityConfig, error::AppError};

/// Local scratch directory that downloads land in before upload.
#[derive(Clone, Debug)]
pub struct Workspace {
    inner: Arc<WorkspaceInner>,
}

#[derive(Debug)]
struct WorkspaceInner {
    root_dir: PathBuf,
}

impl Workspace {
    pub async fn initialize(root: impl AsRef<Path>) -> Result<Self, AppError> {
        let root_dir = root.as_ref().to_path_buf();
        ensure_dir(&root_dir).await?;

        Ok(Self {
            inner: Arc::new(WorkspaceInner { root_dir }),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.inner.root_dir
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.inner.root_dir.join("downloads")
    }

    /// Scratch directory owned by a single job; removed as a whole when the job ends.
    pub fn job_dir(&self, id: Uuid) -> PathBuf {
        self.downloads_dir().join(id.to_string())
    }

    /// Recreates the directory if something removed it while the process was running.
    pub async fn prepare(&self) -> Result<(), AppError> {
        ensure_dir(&self.inner.root_dir).await
    }

    pub async fn ensure_capacity(&self, config: &CapacityConfig) -> Result<(), AppError> {
        if config.minimum_free_bytes == 0 && config.minimum_free_ratio <= 0.0 {
            return Ok(());
        }

        let root = self.inner.root_dir.clone();
        let status = task::spawn_blocking(move || disk_status(&root))
            .await
            .map_err(|err| AppError::external_tool(format!("disk check task failed: {err}")))??;

        let free_ratio = if status.total_bytes > 0 {
            status.free_bytes as f32 / status.total_bytes as f32
        } else {
            1.0
        };

        if status.free_bytes < config.minimum_free_bytes || free_ratio < config.minimum_free_ratio {
            return Err(AppError::external_tool(format!(
                "insufficient disk space in {}: {} bytes free ({:.1}%)",
                self.inner.root_dir.display(),
                status.free_bytes,
                free_ratio * 100.0
            )));
        }

        Ok(())
    }
}

pub async fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    if !dir.exists() {
        fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Removes a directory tree; returns whether anything was there.
pub async fn remove_dir(path: &Path) -> Result<bool, AppError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

struct DiskStatus {
    total_bytes: u64,
    free_bytes: u64,
}

fn disk_status(path: &Path) -> Result<DiskStatus, AppError> {
    let free_bytes = available_space(path)?;
    let total_bytes = total_space(path)?;
    Ok(DiskStatus {
        total_bytes,
        free_bytes,
    })
}
