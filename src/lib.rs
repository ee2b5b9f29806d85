pub mod blob;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod pipeline;
pub mod queue;
pub mod state;
pub mod workspace;
pub mod ytdlp;

pub use blob::BlobStore;
pub use jobs::{DynJobStore, JobRecord, JobStatus, JobStore, LocalJobStore};
pub use queue::{QueueCoordinator, StatusQuery};
pub use state::AppState;
pub use workspace::Workspace;
