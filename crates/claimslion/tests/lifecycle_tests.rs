//! End-to-end tests for the job lifecycle: upload, background analysis,
//! status reads, retry and deletion, driven through `JobLifecycle` with a
//! scripted model.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use claimslion::analysis::PARSE_FAILURE_MESSAGE;
use claimslion::db::{chat_repo, job_repo, row_analysis_repo};
use claimslion::report::normalize;
use claimslion::{
    ClaimsError, ContentStore, IntakeError, JobStatus, LlmError, LocalContentStore, WaitError,
};

use common::{ClaimsCsvBuilder, PayloadBuilder, TestHarness};

#[tokio::test]
async fn test_upload_completes_with_insights() {
    let harness = TestHarness::new();
    let payload = PayloadBuilder::new()
        .insight("Duplicate workshop invoices", "Fraud Indicator", &["CLM-00002", "CLM-00007"])
        .insight("Motor TPL underpriced", "Pricing Mismatch", &["CLM-00003"]);
    harness.model.reply(payload.build());

    let csv = ClaimsCsvBuilder::new().claims(10).build();
    let job = harness.lifecycle.submit("claims.csv", &csv).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.filename, "claims.csv");

    let done = harness.wait(&job.id).await;
    assert_eq!(done.status, JobStatus::Complete);
    assert!(done.error_message.is_none());
    assert!(done.completed_at.is_some());
    assert_eq!(done.row_count, Some(10));
    assert_eq!(done.rows_submitted, Some(10));
    assert!(!done.truncated());

    let result = done.result.expect("complete job carries a result");
    assert_eq!(result, payload.value());
    let report = normalize(&result);
    assert_eq!(report.insights.len(), 2);
    assert!(!report.parse_failed);

    let rows = harness.lifecycle.rows(&job.id).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].sku.as_deref(), Some("CLM-00002"));
    assert_eq!(rows[0].priority.as_deref(), Some("Critical"));

    let request = &harness.model.requests()[0];
    let prompt = &request.messages[0].content;
    assert!(prompt.contains("claims.csv"));
    assert!(prompt.contains("CLM-00010"));
}

#[tokio::test]
async fn test_fenced_reply_is_unwrapped() {
    let harness = TestHarness::new();
    let payload = PayloadBuilder::new().insight("Leakage on glass claims", "Portfolio Leakage", &[]);
    harness.model.reply(payload.build_fenced());

    let done = harness
        .run("claims.csv", &ClaimsCsvBuilder::new().claims(3).build())
        .await;
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.result.unwrap(), payload.value());
}

#[tokio::test]
async fn test_unsupported_extension_creates_nothing() {
    let harness = TestHarness::new();

    let err = harness.lifecycle.submit("claims.pdf", b"%PDF-1.4").unwrap_err();
    assert!(matches!(
        err,
        ClaimsError::Intake(IntakeError::UnsupportedExtension { .. })
    ));
    assert!(harness.lifecycle.list().unwrap().is_empty());
    assert!(harness.stored_files().is_empty());
}

#[tokio::test]
async fn test_upload_size_boundary() {
    let harness = TestHarness::with_config(|c| c.intake.max_upload_bytes = 256);
    harness.model.reply(PayloadBuilder::new().build());

    let header = b"ClaimID,Note\n";
    let mut exact = header.to_vec();
    exact.extend(std::iter::repeat(b'x').take(256 - header.len() - 1));
    exact.push(b'\n');
    assert_eq!(exact.len(), 256);

    let job = harness.lifecycle.submit("exact.csv", &exact).unwrap();
    assert_eq!(harness.wait(&job.id).await.status, JobStatus::Complete);

    let mut over = exact.clone();
    over.insert(header.len(), b'y');
    let err = harness.lifecycle.submit("over.csv", &over).unwrap_err();
    match err {
        ClaimsError::Intake(IntakeError::TooLarge { size, limit }) => {
            assert_eq!(size, 257);
            assert_eq!(limit, 256);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(harness.lifecycle.list().unwrap().len(), 1);
    assert_eq!(harness.stored_files().len(), 1);
}

#[tokio::test]
async fn test_unparseable_reply_completes_with_fallback() {
    let harness = TestHarness::new();
    harness.model.reply("I could not find any notable patterns in this data.");

    let done = harness
        .run("claims.csv", &ClaimsCsvBuilder::new().claims(4).build())
        .await;
    assert_eq!(done.status, JobStatus::Complete);

    let result = done.result.unwrap();
    assert_eq!(result["error"], PARSE_FAILURE_MESSAGE);
    assert_eq!(result["parse_failed"], true);
    assert_eq!(
        result["raw_response"],
        "I could not find any notable patterns in this data."
    );

    let report = normalize(&result);
    assert!(report.parse_failed);
    assert!(report.insights.is_empty());
    assert!(harness.lifecycle.rows(&done.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_model_failure_ends_in_error() {
    let harness = TestHarness::new();
    harness.model.fail(LlmError::Status {
        status: 401,
        body: "invalid x-api-key".to_string(),
    });

    let done = harness
        .run("claims.csv", &ClaimsCsvBuilder::new().claims(2).build())
        .await;
    assert_eq!(done.status, JobStatus::Error);
    assert!(done.result.is_none());
    let message = done.error_message.unwrap();
    assert!(message.contains("401"), "message was {}", message);
}

#[tokio::test]
async fn test_unreadable_spreadsheet_ends_in_error() {
    let harness = TestHarness::new();

    let done = harness.run("claims.csv", b"ClaimID,Amount\n").await;
    assert_eq!(done.status, JobStatus::Error);
    assert!(done.error_message.is_some());
    assert_eq!(harness.model.calls(), 0);
}

#[tokio::test]
async fn test_large_sheet_is_truncated_and_reported() {
    let harness = TestHarness::with_config(|c| c.analysis.max_rows = 25);
    harness.model.reply(PayloadBuilder::new().build());

    let done = harness
        .run("big.csv", &ClaimsCsvBuilder::new().claims(60).build())
        .await;
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.row_count, Some(60));
    assert_eq!(done.rows_submitted, Some(25));
    assert!(done.truncated());

    let prompt = &harness.model.requests()[0].messages[0].content;
    assert!(prompt.contains("25 of 60"));
    assert!(prompt.contains("CLM-00025"));
    assert!(!prompt.contains("CLM-00026"));
}

#[tokio::test]
async fn test_status_moves_forward_only() {
    let harness = TestHarness::new();
    harness.model.reply(PayloadBuilder::new().build());
    let mut events = harness.lifecycle.events().subscribe();

    let job = harness
        .lifecycle
        .submit("claims.csv", &ClaimsCsvBuilder::new().claims(3).build())
        .unwrap();
    let mut seen = vec![job.status];
    while !seen.last().unwrap().is_terminal() {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("no terminal event")
            .unwrap();
        if event.job_id == job.id {
            seen.push(event.status);
        }
    }
    assert_eq!(
        seen,
        vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Complete]
    );
    for pair in seen.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]));
    }

    let terminal = harness.lifecycle.status(&job.id).unwrap();
    for _ in 0..3 {
        assert_eq!(harness.lifecycle.status(&job.id).unwrap(), terminal);
    }
}

#[tokio::test]
async fn test_wait_reports_timeout_separately_from_failure() {
    let harness = TestHarness::new();
    let row = job_repo::JobRow::pending("parked", "a.csv", "parked.csv", "2026-03-01T08:00:00.000000Z");
    job_repo::insert(&harness.db, &row).unwrap();

    let err = harness
        .lifecycle
        .wait_for_terminal("parked", Duration::from_millis(150), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        WaitError::Timeout {
            job_id,
            last_status,
            ..
        } => {
            assert_eq!(job_id, "parked");
            assert_eq!(last_status, JobStatus::Pending);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_creates_new_job_and_keeps_original() {
    let harness = TestHarness::new();
    harness.model.fail(LlmError::Status {
        status: 400,
        body: "bad request".to_string(),
    });
    harness.model.reply(PayloadBuilder::new().insight("Recovered", "Risk Concentration", &[]).build());

    let csv = ClaimsCsvBuilder::new().claims(5).build();
    let failed = harness.run("claims.csv", &csv).await;
    assert_eq!(failed.status, JobStatus::Error);

    let retried = harness.lifecycle.retry(&failed.id).unwrap();
    assert_ne!(retried.id, failed.id);
    assert_eq!(retried.retry_of.as_deref(), Some(failed.id.as_str()));
    assert_eq!(retried.filename, "claims.csv");

    let done = harness.wait(&retried.id).await;
    assert_eq!(done.status, JobStatus::Complete);

    let original = harness.lifecycle.status(&failed.id).unwrap();
    assert_eq!(original, failed);
    assert_eq!(harness.stored_files().len(), 2);
}

#[tokio::test]
async fn test_retry_rejects_running_job() {
    let harness = TestHarness::new();
    let row = job_repo::JobRow::pending("parked", "a.csv", "parked.csv", "2026-03-01T08:00:00.000000Z");
    job_repo::insert(&harness.db, &row).unwrap();

    let err = harness.lifecycle.retry("parked").unwrap_err();
    assert!(matches!(err, ClaimsError::JobNotTerminal { .. }));
    assert!(matches!(
        harness.lifecycle.retry("missing").unwrap_err(),
        ClaimsError::JobNotFound(_)
    ));
}

#[tokio::test]
async fn test_delete_leaves_no_orphans() {
    let harness = TestHarness::new();
    harness.model.reply(
        PayloadBuilder::new()
            .insight("Clustered theft claims", "Fraud Indicator", &["CLM-00001"])
            .build(),
    );
    harness.model.reply("The Riyadh cluster drives most of the exposure.");

    let done = harness
        .run("claims.csv", &ClaimsCsvBuilder::new().claims(6).build())
        .await;
    harness.chat.ask(&done.id, "Where is the exposure?").await.unwrap();

    assert_eq!(chat_repo::count_for_job(&harness.db, &done.id).unwrap(), 2);
    assert_eq!(row_analysis_repo::list_for_job(&harness.db, &done.id).unwrap().len(), 1);
    assert_eq!(harness.stored_files().len(), 1);

    assert!(harness.lifecycle.delete(&done.id).unwrap());

    assert!(matches!(
        harness.lifecycle.status(&done.id).unwrap_err(),
        ClaimsError::JobNotFound(_)
    ));
    assert_eq!(chat_repo::count_for_job(&harness.db, &done.id).unwrap(), 0);
    assert!(row_analysis_repo::list_for_job(&harness.db, &done.id).unwrap().is_empty());
    assert!(harness.stored_files().is_empty());

    assert!(!harness.lifecycle.delete(&done.id).unwrap());
}

#[tokio::test]
async fn test_delete_all_clears_jobs_and_files() {
    let harness = TestHarness::new();
    for _ in 0..3 {
        harness.model.reply(PayloadBuilder::new().build());
    }
    for i in 0..3 {
        harness
            .run(&format!("batch-{}.csv", i), &ClaimsCsvBuilder::new().claims(2).build())
            .await;
    }

    let listed = harness.lifecycle.list().unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    assert_eq!(harness.lifecycle.delete_all().unwrap(), 3);
    assert!(harness.lifecycle.list().unwrap().is_empty());
    assert!(harness.stored_files().is_empty());
}

#[tokio::test]
async fn test_sweeper_recovers_and_processes_backlog() {
    let harness = TestHarness::with_config(|c| c.worker.sweep_interval_secs = 1);
    harness.model.reply(PayloadBuilder::new().build());

    // A job stranded mid-analysis by a previous process.
    let mut stuck = job_repo::JobRow::pending("stuck", "old.csv", "stuck.csv", "2026-03-01T08:00:00.000000Z");
    stuck.status = "processing".to_string();
    job_repo::insert(&harness.db, &stuck).unwrap();

    // A pending job that was never dispatched.
    let store = LocalContentStore::new(harness.uploads_dir());
    let csv = ClaimsCsvBuilder::new().claims(2).build();
    let file_ref = store.put("backlog", "csv", &csv).unwrap();
    let backlog = job_repo::JobRow::pending("backlog", "backlog.csv", &file_ref, "2026-03-01T08:00:01.000000Z");
    job_repo::insert(&harness.db, &backlog).unwrap();

    let cancel = CancellationToken::new();
    let handle = harness.lifecycle.sweeper().spawn(cancel.clone());

    let done = harness.wait("backlog").await;
    assert_eq!(done.status, JobStatus::Complete);

    let stuck = harness.lifecycle.status("stuck").unwrap();
    assert_eq!(stuck.status, JobStatus::Error);
    assert!(stuck.error_message.is_some());

    cancel.cancel();
    handle.await.unwrap();
}
