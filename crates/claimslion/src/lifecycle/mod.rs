//! The job lifecycle as one interface: submit, read status, wait for a
//! terminal state, retry and delete.
//!
//! Status delivery is push based. Waiters subscribe to job events and
//! re-read the store whenever something happens, so the store stays the
//! only source of truth and a missed event costs at most one fallback
//! poll interval.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::analysis::Analyzer;
use crate::broadcast::JobEventBroadcaster;
use crate::config::Config;
use crate::db::job_repo;
use crate::db::row_analysis_repo;
use crate::db::{Database, DatabaseError};
use crate::error::{ClaimsError, Result};
use crate::intake::Intake;
use crate::job::{Job, JobStatus, RowAnalysis};
use crate::llm::TextGenerator;
use crate::storage::ContentStore;
use crate::worker::{Dispatcher, JobProcessor, QueueSweeper};

/// Re-read interval used when no event arrives.
const POLL_FALLBACK: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The ceiling was reached while the job was still running. Distinct
    /// from an analysis failure, which is a terminal `error` job.
    #[error("Timed out after {}s waiting for job {job_id} (last status: {last_status})", .waited.as_secs())]
    Timeout {
        job_id: String,
        last_status: JobStatus,
        waited: Duration,
    },

    #[error("Wait cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A scheduled wait started by [`JobLifecycle::on_complete`].
pub struct WaitHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WaitHandle {
    /// Stops waiting. The callback then receives `WaitError::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the callback has run.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            log::error!("Completion callback task failed: {}", e);
        }
    }
}

#[derive(Clone)]
pub struct JobLifecycle {
    db: Database,
    store: Arc<dyn ContentStore>,
    intake: Arc<Intake>,
    dispatcher: Dispatcher,
    events: JobEventBroadcaster,
    config: Arc<Config>,
}

impl JobLifecycle {
    pub fn new(
        config: &Config,
        db: Database,
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let events = JobEventBroadcaster::default();
        let analyzer = Analyzer::new(generator, config.analysis.clone());
        let processor = JobProcessor::new(
            db.clone(),
            Arc::clone(&store),
            Arc::new(analyzer),
            events.clone(),
        );
        let dispatcher = Dispatcher::new(Arc::new(processor), config.worker.max_in_flight);
        let intake = Intake::new(db.clone(), Arc::clone(&store), config.intake.clone());

        Self {
            db,
            store,
            intake: Arc::new(intake),
            dispatcher,
            events,
            config: Arc::new(config.clone()),
        }
    }

    pub fn events(&self) -> &JobEventBroadcaster {
        &self.events
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.intake.max_upload_bytes()
    }

    /// Sweeper sharing this lifecycle's dispatcher and events.
    pub fn sweeper(&self) -> QueueSweeper {
        QueueSweeper::new(
            self.db.clone(),
            self.dispatcher.clone(),
            self.events.clone(),
            self.config.worker.clone(),
        )
    }

    /// Accepts an upload and starts its analysis in the background.
    pub fn submit(&self, filename: &str, bytes: &[u8]) -> Result<Job> {
        let job = self.intake.submit(filename, bytes)?;
        self.dispatcher.dispatch(&job.id);
        Ok(job)
    }

    /// Current state of a job. Reading never triggers processing.
    pub fn status(&self, id: &str) -> Result<Job> {
        self.find(id)?
            .ok_or_else(|| ClaimsError::JobNotFound(id.to_string()))
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Result<Vec<Job>> {
        job_repo::list_all(&self.db)?
            .iter()
            .map(|row| Job::from_job_row(row).map_err(ClaimsError::from))
            .collect()
    }

    pub fn rows(&self, id: &str) -> Result<Vec<RowAnalysis>> {
        self.status(id)?;
        Ok(row_analysis_repo::list_for_job(&self.db, id)?
            .iter()
            .map(RowAnalysis::from_row)
            .collect())
    }

    /// Clamps a requested wait to the configured ceiling, using the
    /// default when none is given.
    pub fn wait_duration(&self, requested_secs: Option<u64>) -> Duration {
        let status = &self.config.status;
        let secs = requested_secs
            .unwrap_or(status.default_wait_secs)
            .min(status.wait_ceiling_secs);
        Duration::from_secs(secs)
    }

    /// Waits until the job is `complete` or `error`, at most `ceiling`.
    pub async fn wait_for_terminal(
        &self,
        id: &str,
        ceiling: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<Job, WaitError> {
        // Subscribe before the first read so no transition slips between.
        let mut rx = self.events.subscribe();
        let deadline = Instant::now() + ceiling;
        let mut events_open = true;

        loop {
            let job = self
                .find(id)?
                .ok_or_else(|| WaitError::NotFound(id.to_string()))?;
            if job.status.is_terminal() {
                return Ok(job);
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => {
                        return Err(WaitError::Timeout {
                            job_id: id.to_string(),
                            last_status: job.status,
                            waited: ceiling,
                        });
                    }
                    _ = tokio::time::sleep(POLL_FALLBACK) => break,
                    event = rx.recv(), if events_open => match event {
                        Ok(event) if event.job_id != id => continue,
                        Ok(_) | Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => {
                            events_open = false;
                            break;
                        }
                    },
                }
            }
        }
    }

    /// Runs `callback` once the job reaches a terminal state, the
    /// configured ceiling passes, or the handle is cancelled.
    pub fn on_complete<F>(&self, id: &str, callback: F) -> WaitHandle
    where
        F: FnOnce(std::result::Result<Job, WaitError>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let lifecycle = self.clone();
        let id = id.to_string();
        let token = cancel.clone();
        let ceiling = Duration::from_secs(self.config.status.wait_ceiling_secs);

        let task = tokio::spawn(async move {
            let result = lifecycle.wait_for_terminal(&id, ceiling, &token).await;
            callback(result);
        });

        WaitHandle { cancel, task }
    }

    /// Starts a fresh job over a copy of a finished job's file. The
    /// original job is left as it is.
    pub fn retry(&self, id: &str) -> Result<Job> {
        let original = self.status(id)?;
        if !original.status.is_terminal() {
            return Err(ClaimsError::JobNotTerminal {
                id: original.id,
                status: original.status,
            });
        }
        let job = self.intake.resubmit(&original)?;
        self.dispatcher.dispatch(&job.id);
        log::info!("Job {} retried as {}", original.id, job.id);
        Ok(job)
    }

    /// Deletes a job, its chat messages, its derived rows and its stored
    /// file. Returns `false` for an unknown job.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(job) = self.find(id)? else {
            return Ok(false);
        };
        let deleted = job_repo::delete(&self.db, id)?;
        self.remove_file(&job.file_ref);
        Ok(deleted)
    }

    pub fn delete_all(&self) -> Result<u64> {
        let rows = job_repo::list_all(&self.db)?;
        let deleted = job_repo::delete_all(&self.db)?;
        for row in &rows {
            self.remove_file(&row.file_ref);
        }
        log::info!("Deleted {} jobs", deleted);
        Ok(deleted)
    }

    fn find(&self, id: &str) -> std::result::Result<Option<Job>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)?
            .map(|row| Job::from_job_row(&row))
            .transpose()
    }

    fn remove_file(&self, file_ref: &str) {
        if let Err(e) = self.store.delete(file_ref) {
            log::warn!("Failed to remove stored file {}: {}", file_ref, e);
        }
    }
}
