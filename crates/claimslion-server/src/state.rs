//! Shared state handed to every handler.

use std::sync::Arc;

use claimslion::{ChatService, JobLifecycle};
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub lifecycle: JobLifecycle,
    pub chat: ChatService,
    /// Cancelled when the server shuts down; long waits stop with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(lifecycle: JobLifecycle, chat: ChatService, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            lifecycle,
            chat,
            shutdown,
        })
    }
}
