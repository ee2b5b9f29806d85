use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub capacity: CapacityConfig,
    pub blob: BlobConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            queue: QueueConfig::from_env(),
            capacity: CapacityConfig::from_env(),
            blob: BlobConfig::from_env(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_url: Option<String>,
    /// Categories accepted by the in-memory catalog when no database is configured.
    pub local_categories: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let addr = env::var("VINGEST_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|err| AppError::validation(format!("invalid VINGEST_ADDR: {err}")))?;
        let database_url = non_empty_var("DATABASE_URL");
        let local_categories: Vec<String> = non_empty_var("VINGEST_LOCAL_CATEGORIES")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            addr,
            database_url,
            local_categories,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub work_dir: PathBuf,
    pub ytdlp_bin: String,
    /// Persisted active rows older than this no longer block a forced drain.
    pub stale_after: Duration,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let work_dir = non_empty_var("VINGEST_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("vingest"));

        let ytdlp_bin = non_empty_var("VINGEST_YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string());

        let stale_hours = env::var("VINGEST_STALE_AFTER_HOURS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .filter(|&hours| hours > 0)
            .unwrap_or(6);

        Self {
            work_dir,
            ytdlp_bin,
            stale_after: Duration::from_secs(stale_hours * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapacityConfig {
    pub minimum_free_bytes: u64,
    pub minimum_free_ratio: f32,
}

impl CapacityConfig {
    pub fn from_env() -> Self {
        let minimum_free_bytes = env::var("VINGEST_MIN_FREE_BYTES")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(2 * 1024 * 1024 * 1024); // 2 GiB

        let minimum_free_ratio = env::var("VINGEST_MIN_FREE_RATIO")
            .ok()
            .and_then(|val| val.parse::<f32>().ok())
            .map(|ratio| ratio.clamp(0.0, 0.9))
            .unwrap_or(0.05);

        Self {
            minimum_free_bytes,
            minimum_free_ratio,
        }
    }

    pub fn disabled() -> Self {
        Self {
            minimum_free_bytes: 0,
            minimum_free_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub bucket: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub public_base_url: Option<String>,
    pub prefix: String,
    pub cache_control: String,
}

impl BlobConfig {
    pub fn from_env() -> Self {
        let prefix = non_empty_var("VINGEST_OBJECT_PREFIX")
            .map(|value| value.trim_matches('/').to_string())
            .unwrap_or_else(|| "videos".to_string());

        Self {
            bucket: non_empty_var("VINGEST_BUCKET"),
            region: non_empty_var("VINGEST_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: non_empty_var("VINGEST_S3_ENDPOINT"),
            access_key_id: non_empty_var("VINGEST_S3_ACCESS_KEY_ID"),
            secret_access_key: non_empty_var("VINGEST_S3_SECRET_ACCESS_KEY"),
            public_base_url: non_empty_var("VINGEST_PUBLIC_BASE_URL"),
            prefix,
            cache_control: non_empty_var("VINGEST_CACHE_CONTROL")
                .unwrap_or_else(|| "public, max-age=31536000, immutable".to_string()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
