use std::sync::Arc;

use crate::queue::QueueCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<QueueCoordinator>,
}
