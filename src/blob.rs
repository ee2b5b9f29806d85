use std::{path::Path, sync::Arc};

use futures::StreamExt;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, WriteMultipart, aws::AmazonS3Builder,
    local::LocalFileSystem, path::Path as ObjectPath,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::{config::BlobConfig, error::AppError, workspace::ensure_dir};

const READ_CHUNK_BYTES: usize = 1024 * 1024;
const MAX_PARTS_IN_FLIGHT: usize = 4;

/// Object storage target for finished downloads.
#[derive(Clone, Debug)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    public_base_url: String,
    cache_control: Option<String>,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            cache_control: None,
        }
    }

    /// Only set on backends that persist object attributes.
    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    /// S3 when a bucket is configured, otherwise a directory under `local_root`.
    pub async fn from_config(config: &BlobConfig, local_root: &Path) -> Result<Self, AppError> {
        let Some(bucket) = config.bucket.as_deref() else {
            ensure_dir(local_root).await?;
            let store = LocalFileSystem::new_with_prefix(local_root)?;
            let public = config
                .public_base_url
                .clone()
                .unwrap_or_else(|| format!("file://{}", local_root.display()));
            tracing::warn!(root = %local_root.display(), "no bucket configured, storing blobs on local disk");
            return Ok(Self::new(Arc::new(store), config.prefix.clone(), public));
        };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&config.region);
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let default_public = match &config.endpoint {
            Some(endpoint) => {
                let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.clone()
                } else {
                    format!("https://{endpoint}")
                };
                builder = builder
                    .with_endpoint(&endpoint)
                    .with_allow_http(endpoint.starts_with("http://"))
                    .with_virtual_hosted_style_request(false);
                format!("{}/{bucket}", endpoint.trim_end_matches('/'))
            }
            None => format!("https://{bucket}.s3.{}.amazonaws.com", config.region),
        };

        let store = builder.build()?;
        let public = config.public_base_url.clone().unwrap_or(default_public);
        tracing::info!(bucket, prefix = %config.prefix, "blob storage backed by S3");

        Ok(Self::new(Arc::new(store), config.prefix.clone(), public)
            .with_cache_control(config.cache_control.clone()))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// A listing round-trip against the configured prefix.
    pub async fn ensure_available(&self) -> Result<(), AppError> {
        let prefix = self.prefix_path();
        self.store
            .list_with_delimiter(prefix.as_ref())
            .await
            .map(|_| ())
            .map_err(|err| AppError::storage_unavailable(err.to_string()))
    }

    pub fn object_key(&self, local_path: &Path) -> Result<ObjectPath, AppError> {
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::upload(format!("{} has no usable file name", local_path.display()))
            })?;

        Ok(ObjectPath::from_iter(
            self.prefix
                .split('/')
                .filter(|part| !part.is_empty())
                .chain(std::iter::once(file_name)),
        ))
    }

    pub fn public_url(&self, key: &ObjectPath) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    pub async fn upload(&self, local_path: &Path) -> Result<String, AppError> {
        let key = self.object_key(local_path)?;
        let file = File::open(local_path).await?;
        let size = file.metadata().await?.len();

        tracing::debug!(path = %local_path.display(), %key, bytes = size, "upload starting");

        let upload = self
            .store
            .put_multipart_opts(
                &key,
                PutMultipartOpts {
                    attributes: self.attributes_for(local_path),
                    ..Default::default()
                },
            )
            .await
            .map_err(|err| AppError::upload(err.to_string()))?;

        let mut writer = WriteMultipart::new(upload);
        let mut chunks = ReaderStream::with_capacity(file, READ_CHUNK_BYTES);

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    if let Err(abort_err) = writer.abort().await {
                        tracing::warn!(%key, error = %abort_err, "failed to abort multipart upload");
                    }
                    return Err(AppError::upload(format!("reading {}: {err}", local_path.display())));
                }
            };
            if let Err(err) = writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await {
                return Err(AppError::upload(err.to_string()));
            }
            writer.put(chunk);
        }

        writer
            .finish()
            .await
            .map_err(|err| AppError::upload(err.to_string()))?;

        let url = self.public_url(&key);
        tracing::debug!(%key, %url, "upload finished");
        Ok(url)
    }

    fn prefix_path(&self) -> Option<ObjectPath> {
        (!self.prefix.is_empty()).then(|| ObjectPath::from_iter(self.prefix.split('/')))
    }

    fn attributes_for(&self, local_path: &Path) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(cache_control) = &self.cache_control {
            let content_type = mime_guess::from_path(local_path).first_or(mime::APPLICATION_OCTET_STREAM);
            attributes.insert(Attribute::CacheControl, cache_control.clone().into());
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        attributes
    }
}
