//! End-to-end tests of the HTTP API against a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use claimslion::config::Config;
use claimslion::{
    ChatService, Database, Generation, GenerationRequest, JobLifecycle, LlmError,
    LocalContentStore, TextGenerator,
};
use claimslion_server::{serve, AppState};

const CLAIMS_CSV: &str = "ClaimID,PolicyNumber,Region,Product,ClaimAmount,Premium\n\
CLM-001,POL-1,Riyadh,MOTOR-COMP,12000,3000\n\
CLM-002,POL-1,Riyadh,MOTOR-COMP,14500,3000\n\
CLM-003,POL-2,Jeddah,MEDICAL-GOLD,800,5200\n";

#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    fn reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(text.into());
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, _request: GenerationRequest) -> Result<Generation, LlmError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(Generation { text, usage: None }),
            None => Err(LlmError::EmptyResponse),
        }
    }
}

fn analysis_reply() -> String {
    json!({
        "Insights": [
            {
                "Title": "Repeat claims on one motor policy",
                "Category": "Fraud Indicator",
                "PatternSummary": "Two large claims on POL-1 within a month",
                "SupportingEvidence": {"Region": "Riyadh", "ClaimCount": 2},
                "PossibleExplanations": ["Staged collision"],
                "SuggestedAction": "Refer POL-1 to SIU",
                "MatchingIDs": ["CLM-001", "CLM-002"]
            },
            {
                "Title": "Medical premium well above losses",
                "Category": "Pricing Mismatch",
                "PatternSummary": "Loss ratio of 15% on MEDICAL-GOLD",
                "SupportingEvidence": {"Region": "Jeddah"},
                "PossibleExplanations": [],
                "SuggestedAction": "Review pricing",
                "MatchingIDs": ["CLM-003"]
            }
        ],
        "AuditSummary": {
            "SummaryTitle": "Motor fraud risk",
            "AuditSummary": "Most loss sits in two Riyadh motor claims."
        }
    })
    .to_string()
}

struct TestServer {
    _temp_dir: TempDir,
    base: String,
    model: Arc<ScriptedModel>,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_directory = temp_dir.path().to_string_lossy().into_owned();
        config.worker.inter_task_delay_ms = 0;
        configure(&mut config);

        let db = Database::open(&config.database_path()).unwrap();
        let store = Arc::new(LocalContentStore::new(config.uploads_dir()));
        let model = Arc::new(ScriptedModel::default());
        let generator: Arc<dyn TextGenerator> = model.clone();

        let lifecycle = JobLifecycle::new(&config, db.clone(), store, Arc::clone(&generator));
        let chat = ChatService::new(db, generator, config.chat.clone());
        let shutdown = CancellationToken::new();
        let state = AppState::new(lifecycle, chat, shutdown.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let stop = shutdown.clone();
        tokio::spawn(serve(listener, state, async move { stop.cancelled().await }));

        Self {
            _temp_dir: temp_dir,
            base,
            model,
            shutdown,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        self.client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    /// Uploads the sample sheet and waits for the analysis to finish.
    async fn completed_job(&self) -> String {
        self.model.reply(analysis_reply());
        let response = self.upload("claims.csv", CLAIMS_CSV.as_bytes().to_vec()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: Value = response.json().await.unwrap();
        let id = body["jobId"].as_str().unwrap().to_string();

        let (status, job) = self
            .get_json(&format!("/api/jobs/{}/wait?timeoutSecs=10", id))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "complete");
        id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_upload_then_wait_returns_report() {
    let server = TestServer::start().await;
    let id = server.completed_job().await;

    let (status, job) = server.get_json(&format!("/api/jobs/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["filename"], "claims.csv");
    assert_eq!(job["rowCount"], 3);
    assert_eq!(job["truncated"], false);
    assert_eq!(job["report"]["insights"].as_array().unwrap().len(), 2);

    let (_, status_body) = server.get_json(&format!("/api/jobs/{}/status", id)).await;
    assert_eq!(status_body["jobId"], id.as_str());
    assert_eq!(status_body["status"], "complete");
    assert!(status_body.get("error").is_none());

    let (_, list) = server.get_json("/api/jobs").await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0].get("result").is_none());
}

#[tokio::test]
async fn test_rejected_uploads_create_no_job() {
    let server = TestServer::start_with(|config| config.intake.max_upload_bytes = 1024).await;

    let wrong_type = server.upload("claims.pdf", b"%PDF-1.4".to_vec()).await;
    assert_eq!(wrong_type.status(), StatusCode::BAD_REQUEST);
    let body: Value = wrong_type.json().await.unwrap();
    assert_eq!(body["code"], "bad_request");

    let oversize = server.upload("claims.csv", vec![b'a'; 2048]).await;
    assert_eq!(oversize.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = oversize.json().await.unwrap();
    assert_eq!(body["code"], "file_too_large");

    let missing_field = server
        .client
        .post(server.url("/api/upload"))
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);

    let (_, list) = server.get_json("/api/jobs").await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let server = TestServer::start().await;
    for path in [
        "/api/jobs/missing",
        "/api/jobs/missing/status",
        "/api/jobs/missing/wait?timeoutSecs=1",
        "/api/chat/missing",
    ] {
        let (status, body) = server.get_json(path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(body["code"], "not_found", "{}", path);
    }

    let response = server
        .client
        .delete(server.url("/api/jobs/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_analysis_is_reported_as_error_job() {
    let server = TestServer::start().await;
    // No scripted reply: the model returns no content.
    let response = server.upload("claims.csv", CLAIMS_CSV.as_bytes().to_vec()).await;
    let body: Value = response.json().await.unwrap();
    let id = body["jobId"].as_str().unwrap();

    let (status, job) = server
        .get_json(&format!("/api/jobs/{}/wait?timeoutSecs=10", id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "error");
    assert!(job["errorMessage"].as_str().is_some());

    let summary = server
        .client
        .get(server.url(&format!("/api/jobs/{}/summary", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(summary.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_chat_round_trip() {
    let server = TestServer::start().await;
    let id = server.completed_job().await;
    server.model.reply("POL-1 accounts for 92% of paid losses.");

    let response = server
        .client
        .post(server.url(&format!("/api/chat/{}", id)))
        .json(&json!({ "message": "Which policy matters most?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["response"], "POL-1 accounts for 92% of paid losses.");

    let (_, history) = server.get_json(&format!("/api/chat/{}", id)).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[1]["role"], "assistant");

    let empty = server
        .client
        .post(server.url(&format!("/api/chat/{}", id)))
        .json(&json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rows_filters_and_summary() {
    let server = TestServer::start().await;
    let id = server.completed_job().await;

    let (status, all) = server.get_json(&format!("/api/jobs/{}/rows", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["total"], 2);
    assert_eq!(all["rows"].as_array().unwrap().len(), 2);
    assert_eq!(all["filters"]["regions"], json!(["Jeddah", "Riyadh"]));

    let (_, riyadh) = server
        .get_json(&format!("/api/jobs/{}/rows?region=Riyadh", id))
        .await;
    let rows = riyadh["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["priority"], "Critical");
    assert_eq!(rows[0]["badge"], "destructive");
    assert_eq!(riyadh["total"], 2);

    let (_, summary) = server.get_json(&format!("/api/jobs/{}/summary", id)).await;
    assert_eq!(summary["totalInsights"], 2);
}

#[tokio::test]
async fn test_retry_and_delete() {
    let server = TestServer::start().await;
    let id = server.completed_job().await;
    server.model.reply(analysis_reply());

    let retry = server
        .client
        .post(server.url(&format!("/api/jobs/{}/retry", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::ACCEPTED);
    let body: Value = retry.json().await.unwrap();
    assert_eq!(body["retryOf"], id.as_str());
    let retried = body["jobId"].as_str().unwrap().to_string();
    assert_ne!(retried, id);
    server
        .get_json(&format!("/api/jobs/{}/wait?timeoutSecs=10", retried))
        .await;

    let deleted = server
        .client
        .delete(server.url(&format!("/api/jobs/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    let body: Value = deleted.json().await.unwrap();
    assert_eq!(body["success"], true);

    let (status, _) = server.get_json(&format!("/api/jobs/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let cleared = server
        .client
        .delete(server.url("/api/jobs"))
        .send()
        .await
        .unwrap();
    let body: Value = cleared.json().await.unwrap();
    assert_eq!(body["deleted"], 1);
}
