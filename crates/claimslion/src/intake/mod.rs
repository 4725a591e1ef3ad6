//! Upload intake: validation, blob storage and creation of the pending job.
//!
//! All validation happens before any side effect, so a rejected upload
//! leaves neither a job row nor a stored file behind.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::db::job_repo::{self, JobRow};
use crate::db::{format_timestamp, Database};
use crate::error::{ClaimsError, IntakeError};
use crate::job::Job;
use crate::sanitize;
use crate::storage::ContentStore;

/// An upload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub filename: String,
    pub extension: String,
}

pub struct Intake {
    db: Database,
    store: Arc<dyn ContentStore>,
    config: IntakeConfig,
}

impl Intake {
    pub fn new(db: Database, store: Arc<dyn ContentStore>, config: IntakeConfig) -> Self {
        Self { db, store, config }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.config.max_upload_bytes
    }

    /// Checks name, extension and size without touching storage.
    pub fn validate(&self, filename: &str, size: u64) -> Result<ValidatedUpload, IntakeError> {
        let filename = sanitize::redact_filename(filename);
        if filename == "<unknown>" {
            return Err(IntakeError::MissingFilename);
        }

        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let allowed = self
            .config
            .allowed_extensions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&extension));
        if !allowed {
            return Err(IntakeError::UnsupportedExtension {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{}", extension)
                },
                allowed: self
                    .config
                    .allowed_extensions
                    .iter()
                    .map(|a| format!(".{}", a))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        if size > self.config.max_upload_bytes {
            return Err(IntakeError::TooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }

        if size == 0 {
            return Err(IntakeError::Empty);
        }

        Ok(ValidatedUpload {
            filename,
            extension,
        })
    }

    /// Accepts an upload: exactly one stored file and one `pending` job.
    pub fn submit(&self, filename: &str, bytes: &[u8]) -> Result<Job, ClaimsError> {
        let upload = self.validate(filename, bytes.len() as u64)?;
        self.create_job(&upload, bytes, None)
    }

    /// Creates a new `pending` job over a copy of an existing job's file.
    ///
    /// The original job is left untouched.
    pub fn resubmit(&self, original: &Job) -> Result<Job, ClaimsError> {
        let bytes = self.store.get(&original.file_ref)?;
        let upload = self.validate(&original.filename, bytes.len() as u64)?;
        self.create_job(&upload, &bytes, Some(original.id.clone()))
    }

    fn create_job(
        &self,
        upload: &ValidatedUpload,
        bytes: &[u8],
        retry_of: Option<String>,
    ) -> Result<Job, ClaimsError> {
        let id = Uuid::new_v4().to_string();
        let file_ref = self.store.put(&id, &upload.extension, bytes)?;

        let mut row = JobRow::pending(
            &id,
            &upload.filename,
            &file_ref,
            &format_timestamp(Utc::now()),
        );
        row.retry_of = retry_of;

        if let Err(e) = job_repo::insert(&self.db, &row) {
            // Keep store and table consistent: no file without a job.
            if let Err(cleanup) = self.store.delete(&file_ref) {
                log::warn!("Failed to remove orphaned upload {}: {}", file_ref, cleanup);
            }
            return Err(e.into());
        }

        log::info!(
            "Accepted upload {} ({} bytes) as job {}",
            upload.filename,
            bytes.len(),
            id
        );

        Ok(Job::from_job_row(&row)?)
    }
}
