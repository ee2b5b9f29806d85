use std::{
    convert::Infallible,
    env,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{http::Request, response::Response as AxumResponse};
use tower::{Service, layer::Layer};
use tower_http::cors::CorsLayer;
use vingest::{
    blob::BlobStore,
    catalog::{DynVideoCatalog, LocalVideoCatalog},
    config::AppConfig,
    db::{self, PgJobStore, PgVideoCatalog},
    handlers,
    jobs::{DynJobStore, LocalJobStore},
    pipeline::Pipeline,
    queue::QueueCoordinator,
    state::AppState,
    workspace::Workspace,
    ytdlp::{DynMediaFetcher, YtDlp},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = AppConfig::from_env()?;

    let workspace = Workspace::initialize(&config.queue.work_dir).await?;
    let blobs = BlobStore::from_config(&config.blob, &workspace.root_dir().join("blobs")).await?;

    let jobs: DynJobStore;
    let catalog: DynVideoCatalog;
    match &config.server.database_url {
        Some(url) => {
            let pool = db::init_pool(url).await?;
            jobs = Arc::new(PgJobStore::new(pool.clone()));
            catalog = Arc::new(PgVideoCatalog::new(pool));
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs and videos are kept in memory only");
            jobs = Arc::new(LocalJobStore::new());
            catalog = Arc::new(LocalVideoCatalog::with_categories(
                config.server.local_categories.clone(),
            ));
        }
    }

    let ytdlp = YtDlp::new(config.queue.ytdlp_bin.clone());
    tracing::info!(bin = ytdlp.bin(), dir = %workspace.downloads_dir().display(), "media fetcher configured");
    let fetcher: DynMediaFetcher = Arc::new(ytdlp);

    let pipeline = Pipeline::new(fetcher, blobs, catalog, workspace, config.capacity.clone());
    let queue = QueueCoordinator::new(jobs, pipeline, config.queue.stale_after);

    queue.recover_interrupted().await?;
    queue.start_next();

    let state = AppState { queue };

    let app = handlers::router(state)
        .layer(CorsLayer::permissive())
        .layer(RequestLoggerLayer);

    let addr = config.server.addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ingestion server listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let env_filter = env::var("RUST_LOG")
        .unwrap_or_else(|_| "vingest=debug,axum=info,tower_http=info".to_string());

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter.clone())
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    if init_result.is_ok() {
        tracing::debug!(current_filter = %env_filter, "tracing initialized");
    }
}

#[derive(Clone, Default)]
struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLogger<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogger { inner }
    }
}

#[derive(Clone)]
struct RequestLogger<S> {
    inner: S,
}

impl<S, Body> Service<Request<Body>> for RequestLogger<S>
where
    S: Service<Request<Body>, Response = AxumResponse, Error = Infallible> + Send + 'static,
    S::Future: Send + 'static,
    Body: Send + 'static,
{
    type Response = AxumResponse;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = request.method().as_str().to_owned();
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| request.uri().path().to_owned());
        let fut = self.inner.call(request);

        Box::pin(async move {
            let response = fut.await?;
            let status = response.status().as_u16();
            tracing::debug!("{} {} {}", status, method, target);
            Ok(response)
        })
    }
}
