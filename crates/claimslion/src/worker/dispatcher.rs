use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::processor::{JobProcessor, ProcessOutcome};

/// Runs job processing detached from the caller, with at most
/// `max_in_flight` analyses running at once.
#[derive(Clone)]
pub struct Dispatcher {
    processor: Arc<JobProcessor>,
    permits: Arc<Semaphore>,
    queued: Arc<Mutex<HashSet<String>>>,
}

impl Dispatcher {
    pub fn new(processor: Arc<JobProcessor>, max_in_flight: usize) -> Self {
        Self {
            processor,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            queued: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Schedules a job. Returns `None` when the job is already queued or
    /// running in this process.
    pub fn dispatch(&self, job_id: &str) -> Option<JoinHandle<ProcessOutcome>> {
        {
            let mut queued = lock_queued(&self.queued);
            if !queued.insert(job_id.to_string()) {
                debug!(job_id, "Job already dispatched");
                return None;
            }
        }

        let processor = Arc::clone(&self.processor);
        let permits = Arc::clone(&self.permits);
        let queued = Arc::clone(&self.queued);
        let job_id = job_id.to_string();

        Some(tokio::spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => match processor.process(&job_id).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "Failed to process job");
                        ProcessOutcome::Failed(e.to_string())
                    }
                },
                Err(_) => ProcessOutcome::Skipped,
            };

            lock_queued(&queued).remove(&job_id);
            outcome
        }))
    }

    /// Number of analyses that could start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn queued_count(&self) -> usize {
        lock_queued(&self.queued).len()
    }
}

/// Recovers a poisoned guard; the set holds only job ids.
fn lock_queued(queued: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    queued.lock().unwrap_or_else(|poisoned| {
        warn!("Dispatch queue lock poisoned, recovering");
        poisoned.into_inner()
    })
}
