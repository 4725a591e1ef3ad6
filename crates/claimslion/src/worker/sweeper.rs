use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dispatcher::Dispatcher;
use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::WorkerConfig;
use crate::db::job_repo;
use crate::db::{format_timestamp, Database, DatabaseError};

pub const INTERRUPTED_MESSAGE: &str = "Analysis was interrupted by a server restart";

/// Periodically picks up pending jobs that were never dispatched, for
/// example uploads accepted just before a restart.
pub struct QueueSweeper {
    db: Database,
    dispatcher: Dispatcher,
    events: JobEventBroadcaster,
    config: WorkerConfig,
}

impl QueueSweeper {
    pub fn new(
        db: Database,
        dispatcher: Dispatcher,
        events: JobEventBroadcaster,
        config: WorkerConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            events,
            config,
        }
    }

    /// Fails jobs a previous process left in `processing`.
    pub fn recover_interrupted(&self) -> Result<Vec<String>, DatabaseError> {
        let ids = job_repo::fail_interrupted(
            &self.db,
            INTERRUPTED_MESSAGE,
            &format_timestamp(Utc::now()),
        )?;
        for id in &ids {
            self.events.send(JobEvent::failed(id, INTERRUPTED_MESSAGE));
        }
        if !ids.is_empty() {
            warn!(count = ids.len(), "Failed jobs interrupted by restart");
        }
        Ok(ids)
    }

    /// Dispatches up to `max_in_flight` pending jobs, oldest first, pausing
    /// `inter_task_delay_ms` between them. Returns how many were dispatched.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<usize, DatabaseError> {
        let pending = job_repo::list_pending(&self.db, self.config.max_in_flight)?;
        let delay = Duration::from_millis(self.config.inter_task_delay_ms);

        let mut dispatched = 0;
        for (i, row) in pending.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if self.dispatcher.dispatch(&row.id).is_some() {
                dispatched += 1;
            }
        }

        if dispatched > 0 {
            debug!(dispatched, "Sweep dispatched pending jobs");
        }
        Ok(dispatched)
    }

    /// Runs recovery once, then sweeps every `sweep_interval_secs` until
    /// cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        if let Err(e) = self.recover_interrupted() {
            error!(error = %e, "Startup recovery failed");
        }

        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        info!(interval_secs = interval.as_secs(), "Queue sweeper started");

        loop {
            let span = info_span!("sweep_cycle");
            if let Err(e) = self.sweep_once(&cancel).instrument(span).await {
                error!(error = %e, "Queue sweep failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Queue sweeper stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
