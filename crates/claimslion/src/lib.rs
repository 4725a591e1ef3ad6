pub mod analysis;
pub mod broadcast;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod job;
pub mod lifecycle;
pub mod llm;
pub mod presentation;
pub mod report;
pub mod rows;
pub mod sanitize;
pub mod secrets;
pub mod spreadsheet;
pub mod storage;
pub mod worker;

pub use analysis::{AnalysisOutcome, Analyzer};
pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use chat::{ChatError, ChatService};
pub use config::{load_config, load_config_with_env, resolve_api_key, Config};
pub use db::{Database, DatabaseError};
pub use error::{ClaimsError, ConfigError, IntakeError, Result, SpreadsheetError, StorageError};
pub use job::{ChatMessage, ChatRole, Job, JobStatus, RowAnalysis};
pub use lifecycle::{JobLifecycle, WaitError, WaitHandle};
pub use llm::{AnthropicClient, Generation, GenerationRequest, LlmError, TextGenerator};
pub use report::{AnalysisReport, Insight, InsightCategory};
pub use storage::{ContentStore, LocalContentStore};
