//! Upload and job lifecycle handlers.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use claimslion::presentation::{
    group_by_region, group_by_sku, priority_badge, Badge, DashboardSummary, FilterOptions,
    GroupCount, RowFilter,
};
use claimslion::report::normalize;
use claimslion::sanitize::redact_filename;
use claimslion::{AnalysisReport, ClaimsError, IntakeError, Job, JobStatus, RowAnalysis};

use super::ApiResult;
use crate::error::ApiError;
use crate::state::AppState;

/// Multipart field carrying the spreadsheet.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

impl From<&Job> for JobAccepted {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            filename: job.filename.clone(),
            retry_of: job.retry_of.clone(),
        }
    }
}

/// List entry: the job without its payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            filename: job.filename.clone(),
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            error_message: job.error_message.clone(),
            row_count: job.row_count,
            truncated: job.truncated(),
            retry_of: job.retry_of.clone(),
        }
    }
}

/// Full job with the normalized view of its payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
    pub truncated: bool,
}

impl From<Job> for JobDetail {
    fn from(job: Job) -> Self {
        Self {
            report: job.result.as_ref().map(normalize),
            truncated: job.truncated(),
            job,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RowView {
    #[serde(flatten)]
    pub row: RowAnalysis,
    pub badge: Badge,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsResponse {
    pub rows: Vec<RowView>,
    /// Rows before filtering.
    pub total: usize,
    pub filters: FilterOptions,
    pub by_region: Vec<GroupCount>,
    pub by_sku: Vec<GroupCount>,
}

/// POST /api/upload
pub(crate) async fn handle_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or(ClaimsError::Intake(IntakeError::MissingFile))?;
    let job = state.lifecycle.submit(&filename, &bytes)?;
    info!(
        job_id = %job.id,
        filename = %redact_filename(&job.filename),
        size = bytes.len(),
        "Upload accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}

/// GET /api/jobs
pub(crate) async fn handle_list_jobs(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    let jobs = state.lifecycle.list()?;
    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}

/// DELETE /api/jobs
pub(crate) async fn handle_delete_all(
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.lifecycle.delete_all()?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// GET /api/jobs/{id}
pub(crate) async fn handle_get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDetail>> {
    Ok(Json(state.lifecycle.status(&id)?.into()))
}

/// GET /api/jobs/{id}/status
pub(crate) async fn handle_job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let job = state.lifecycle.status(&id)?;
    Ok(Json(StatusResponse {
        job_id: job.id,
        status: job.status,
        error: job.error_message,
        completed_at: job.completed_at,
    }))
}

/// GET /api/jobs/{id}/wait?timeoutSecs=
///
/// Holds the request until the job is terminal. A 504 means the wait
/// ceiling was reached, not that the analysis failed.
pub(crate) async fn handle_wait(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<WaitParams>,
) -> ApiResult<Json<JobDetail>> {
    let ceiling = state.lifecycle.wait_duration(params.timeout_secs);
    let cancel = state.shutdown.child_token();
    let job = state.lifecycle.wait_for_terminal(&id, ceiling, &cancel).await?;
    Ok(Json(job.into()))
}

/// POST /api/jobs/{id}/retry
pub(crate) async fn handle_retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state.lifecycle.retry(&id)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}

/// DELETE /api/jobs/{id}
pub(crate) async fn handle_delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.lifecycle.delete(&id)? {
        return Err(ApiError::NotFound(format!("Job not found: {}", id)));
    }
    Ok(Json(json!({ "success": true, "message": "Job deleted" })))
}

/// GET /api/jobs/{id}/rows?search=&priority=&region=&alerts=
pub(crate) async fn handle_rows(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(filter): Query<RowFilter>,
) -> ApiResult<Json<RowsResponse>> {
    let rows = state.lifecycle.rows(&id)?;
    let filtered = filter.apply(&rows);

    Ok(Json(RowsResponse {
        total: rows.len(),
        filters: FilterOptions::from_rows(&rows),
        by_region: group_by_region(&filtered),
        by_sku: group_by_sku(&filtered),
        rows: filtered
            .into_iter()
            .map(|row| RowView {
                badge: priority_badge(row.priority.as_deref().unwrap_or_default()),
                row,
            })
            .collect(),
    }))
}

/// GET /api/jobs/{id}/summary
pub(crate) async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DashboardSummary>> {
    let job = state.lifecycle.status(&id)?;
    match (&job.status, &job.result) {
        (JobStatus::Complete, Some(result)) => Ok(Json(DashboardSummary::from_report(&normalize(result)))),
        _ => Err(ApiError::Conflict(format!(
            "Job {} is {}; a summary is available once analysis is complete",
            job.id, job.status
        ))),
    }
}
