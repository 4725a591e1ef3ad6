//! Domain types for jobs, chat messages and derived row analysis.
//!
//! These are the typed views handed to callers; the `db` module works on
//! raw rows and this module converts between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::chat_repo::ChatMessageRow;
use crate::db::job_repo::JobRow;
use crate::db::row_analysis_repo::RowAnalysisRow;
use crate::db::{parse_timestamp, DatabaseError};

/// Lifecycle status of a job.
///
/// Only forward moves are valid: `pending → processing → complete | error`,
/// plus `pending → error` for jobs that fail before they are claimed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "complete" => Some(JobStatus::Complete),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Complete)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One uploaded file's end-to-end analysis record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub file_ref: String,
    pub status: JobStatus,
    /// Stored model payload, present only when `status` is `Complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present only when `status` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Data rows found in the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Data rows actually sent to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_submitted: Option<u64>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Job this one re-runs, if it was created by a retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

impl Job {
    /// Whether rows were dropped before submission to the model.
    pub fn truncated(&self) -> bool {
        match (self.row_count, self.rows_submitted) {
            (Some(total), Some(sent)) => sent < total,
            _ => false,
        }
    }

    pub fn from_job_row(row: &JobRow) -> Result<Self, DatabaseError> {
        let status = JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::Corrupt {
            column: "status",
            reason: format!("unknown status '{}' for job {}", row.status, row.id),
        })?;

        let result = match (&row.result, status) {
            (Some(text), JobStatus::Complete) => {
                Some(
                    serde_json::from_str(text).map_err(|e| DatabaseError::Corrupt {
                        column: "result",
                        reason: e.to_string(),
                    })?,
                )
            }
            _ => None,
        };

        let error_message = match status {
            JobStatus::Error => row.error_message.clone(),
            _ => None,
        };

        let token_usage = match (row.input_tokens, row.output_tokens) {
            (None, None) => None,
            (input, output) => Some(TokenUsage {
                input_tokens: input.unwrap_or(0).max(0) as u64,
                output_tokens: output.unwrap_or(0).max(0) as u64,
            }),
        };

        Ok(Self {
            id: row.id.clone(),
            filename: row.filename.clone(),
            file_ref: row.file_ref.clone(),
            status,
            result,
            error_message,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            started_at: row
                .started_at
                .as_deref()
                .map(|s| parse_timestamp("started_at", s))
                .transpose()?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(|s| parse_timestamp("completed_at", s))
                .transpose()?,
            row_count: row.row_count.map(|n| n.max(0) as u64),
            rows_submitted: row.rows_submitted.map(|n| n.max(0) as u64),
            attempts: row.attempts.max(0) as u32,
            token_usage,
            retry_of: row.retry_of.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub job_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_row(row: &ChatMessageRow) -> Result<Self, DatabaseError> {
        let role = ChatRole::parse(&row.role).ok_or_else(|| DatabaseError::Corrupt {
            column: "role",
            reason: format!("unknown chat role '{}'", row.role),
        })?;
        Ok(Self {
            id: row.id.clone(),
            job_id: row.job_id.clone(),
            role,
            content: row.content.clone(),
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

/// Per-line breakdown copied out of a job's result for tabular display.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RowAnalysis {
    pub id: String,
    pub job_id: String,
    pub sku: Option<String>,
    pub region: Option<String>,
    pub recommendation: Option<String>,
    pub alert: Option<String>,
    pub forecast_highlight: Option<String>,
    pub priority: Option<String>,
    pub action: Option<String>,
    pub reason: Option<String>,
}

impl RowAnalysis {
    pub fn from_row(row: &RowAnalysisRow) -> Self {
        Self {
            id: row.id.clone(),
            job_id: row.job_id.clone(),
            sku: row.sku.clone(),
            region: row.region.clone(),
            recommendation: row.recommendation.clone(),
            alert: row.alert.clone(),
            forecast_highlight: row.forecast_highlight.clone(),
            priority: row.priority.clone(),
            action: row.action.clone(),
            reason: row.reason.clone(),
        }
    }

    pub fn to_row(&self, created_at: &str) -> RowAnalysisRow {
        RowAnalysisRow {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            sku: self.sku.clone(),
            region: self.region.clone(),
            recommendation: self.recommendation.clone(),
            alert: self.alert.clone(),
            forecast_highlight: self.forecast_highlight.clone(),
            priority: self.priority.clone(),
            action: self.action.clone(),
            reason: self.reason.clone(),
            created_at: created_at.to_string(),
        }
    }

    pub fn has_alert(&self) -> bool {
        self.alert.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}
