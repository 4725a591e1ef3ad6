use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::analysis::{AnalysisOutcome, Analyzer};
use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::db::job_repo::{self, Completion};
use crate::db::row_analysis_repo;
use crate::db::{format_timestamp, Database, DatabaseError};
use crate::job::{Job, JobStatus};
use crate::report;
use crate::rows;
use crate::sanitize;
use crate::spreadsheet;
use crate::storage::ContentStore;

/// How a call to [`JobProcessor::process`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed(String),
    /// The job was not pending (already claimed, finished or deleted).
    Skipped,
}

/// Runs the analysis for one job and records the terminal state.
pub struct JobProcessor {
    db: Database,
    store: Arc<dyn ContentStore>,
    analyzer: Arc<Analyzer>,
    events: JobEventBroadcaster,
}

impl JobProcessor {
    pub fn new(
        db: Database,
        store: Arc<dyn ContentStore>,
        analyzer: Arc<Analyzer>,
        events: JobEventBroadcaster,
    ) -> Self {
        Self {
            db,
            store,
            analyzer,
            events,
        }
    }

    /// Claims and processes a pending job.
    ///
    /// Once the claim succeeds every path ends in `complete` or `error`,
    /// including a panic inside the analysis. An `Err` is returned only
    /// when the claim itself could not be attempted.
    pub async fn process(&self, job_id: &str) -> Result<ProcessOutcome, DatabaseError> {
        if !job_repo::claim(&self.db, job_id, &format_timestamp(Utc::now()))? {
            debug!(job_id, "Job not claimable, skipping");
            return Ok(ProcessOutcome::Skipped);
        }
        self.events.send(JobEvent::new(job_id, JobStatus::Processing));

        let loaded = job_repo::find_by_id(&self.db, job_id)
            .and_then(|row| row.map(|r| Job::from_job_row(&r)).transpose());
        let job = match loaded {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!(job_id, "Job deleted after claim");
                return Ok(ProcessOutcome::Skipped);
            }
            Err(e) => {
                return Ok(self.finish_failed(job_id, format!("Failed to load job: {}", e)));
            }
        };

        let filename = sanitize::redact_filename(&job.filename);
        let span = info_span!("analysis", job_id = %job.id, filename = %filename);

        let outcome = async {
            match self.run_analysis(&job).await {
                Ok(outcome) => self.persist(&job, outcome),
                Err(message) => self.finish_failed(&job.id, message),
            }
        }
        .instrument(span)
        .await;

        Ok(outcome)
    }

    /// Loads the stored file and runs the analyzer on its own task, so a
    /// panic surfaces as an error message instead of unwinding the worker.
    async fn run_analysis(&self, job: &Job) -> Result<AnalysisOutcome, String> {
        let bytes = self
            .store
            .get(&job.file_ref)
            .map_err(|e| format!("Failed to load uploaded file: {}", e))?;

        let analyzer = Arc::clone(&self.analyzer);
        let filename = job.filename.clone();
        let extension = spreadsheet::extension_of(&job.file_ref).to_string();
        let task = tokio::spawn(
            async move { analyzer.analyze(&filename, &extension, &bytes).await }
                .in_current_span(),
        );

        match task.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join_error) if join_error.is_panic() => {
                error!("Analysis task panicked");
                Err("Analysis failed unexpectedly".to_string())
            }
            Err(_) => Err("Analysis was cancelled".to_string()),
        }
    }

    fn persist(&self, job: &Job, outcome: AnalysisOutcome) -> ProcessOutcome {
        let _step = info_span!("persist_result").entered();

        let shape = report::validate_shape(&outcome.payload);
        if !shape.recognized && !outcome.parse_failed {
            warn!(problems = ?shape.problems, "Model payload does not match the expected shape");
        }

        let result = match serde_json::to_string(&outcome.payload) {
            Ok(text) => text,
            Err(e) => {
                return self.finish_failed(&job.id, format!("Failed to serialize result: {}", e))
            }
        };

        // Derived rows go in first so a caller that observes `complete`
        // also sees them. They are regenerable, so a failure is only logged.
        let created_at = format_timestamp(Utc::now());
        let derived: Vec<_> =
            rows::derive_rows(&job.id, &report::normalize(&outcome.payload), &outcome.payload)
                .iter()
                .map(|r| r.to_row(&created_at))
                .collect();
        if let Err(e) = row_analysis_repo::replace_for_job(&self.db, &job.id, &derived) {
            warn!(error = %e, "Failed to store derived rows");
        }

        let completed_at = format_timestamp(Utc::now());
        let completion = Completion {
            result: &result,
            completed_at: &completed_at,
            row_count: outcome.row_count as i64,
            rows_submitted: outcome.rows_submitted as i64,
            input_tokens: outcome.usage.map(|u| u.input_tokens as i64),
            output_tokens: outcome.usage.map(|u| u.output_tokens as i64),
        };

        match job_repo::complete(&self.db, &job.id, &completion) {
            Ok(true) => {
                info!(
                    rows = outcome.row_count,
                    submitted = outcome.rows_submitted,
                    parse_failed = outcome.parse_failed,
                    "Job complete"
                );
                self.events.send(JobEvent::new(&job.id, JobStatus::Complete));
                ProcessOutcome::Completed
            }
            Ok(false) => {
                debug!("Job left processing before completion, result discarded");
                ProcessOutcome::Skipped
            }
            Err(e) => self.finish_failed(&job.id, format!("Failed to store result: {}", e)),
        }
    }

    fn finish_failed(&self, job_id: &str, message: String) -> ProcessOutcome {
        warn!(job_id, error = %message, "Job failed");
        match job_repo::fail(&self.db, job_id, &message, &format_timestamp(Utc::now())) {
            Ok(_) => self.events.send(JobEvent::failed(job_id, &message)),
            Err(e) => error!(job_id, error = %e, "Failed to record job failure"),
        }
        ProcessOutcome::Failed(message)
    }
}
