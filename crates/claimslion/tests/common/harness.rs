//! Test harness for isolated lifecycle execution.
//!
//! Each harness owns a temp data directory with its own SQLite file and
//! upload store, so tests can inspect both after the fact.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use claimslion::config::Config;
use claimslion::job::TokenUsage;
use claimslion::storage::{ContentStore, LocalContentStore};
use claimslion::{
    ChatService, Database, Generation, GenerationRequest, Job, JobLifecycle, LlmError,
    TextGenerator,
};

/// Replays queued replies in order and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, text: impl Into<String>) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn fail(&self, error: LlmError) -> &Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(Generation {
                text,
                usage: Some(TokenUsage {
                    input_tokens: 120,
                    output_tokens: 40,
                }),
            }),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::EmptyResponse),
        }
    }
}

/// Isolated environment: temp data dir, database file, upload store,
/// lifecycle and chat service sharing one scripted model.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub model: Arc<ScriptedModel>,
    pub lifecycle: JobLifecycle,
    pub chat: ChatService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Builds a harness after letting the caller adjust the defaults.
    pub fn with_config<F: FnOnce(&mut Config)>(adjust: F) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let mut config = Config::default();
        config.data_directory = temp_dir.path().to_string_lossy().into_owned();
        config.status.wait_ceiling_secs = 10;
        config.status.default_wait_secs = 10;
        config.worker.inter_task_delay_ms = 0;
        adjust(&mut config);

        let db = Database::open(&config.database_path()).expect("Failed to open database");
        let store: Arc<dyn ContentStore> = Arc::new(LocalContentStore::new(config.uploads_dir()));
        let model = Arc::new(ScriptedModel::new());
        let lifecycle = JobLifecycle::new(&config, db.clone(), store, model.clone());
        let chat = ChatService::new(db.clone(), model.clone(), config.chat.clone());

        Self {
            temp_dir,
            config,
            db,
            model,
            lifecycle,
            chat,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.config.uploads_dir()
    }

    /// Files currently held by the upload store.
    pub fn stored_files(&self) -> Vec<String> {
        match std::fs::read_dir(self.uploads_dir()) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    /// Waits for a terminal state, failing the test on timeout.
    pub async fn wait(&self, id: &str) -> Job {
        self.lifecycle
            .wait_for_terminal(id, Duration::from_secs(10), &CancellationToken::new())
            .await
            .expect("job did not reach a terminal state")
    }

    /// Submits an upload and waits for it to finish.
    pub async fn run(&self, filename: &str, bytes: &[u8]) -> Job {
        let job = self
            .lifecycle
            .submit(filename, bytes)
            .expect("upload rejected");
        self.wait(&job.id).await
    }
}
