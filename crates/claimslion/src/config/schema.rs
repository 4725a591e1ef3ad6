use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_directory: default_data_directory(),
            server: ServerConfig::default(),
            intake: IntakeConfig::default(),
            analysis: AnalysisConfig::default(),
            worker: WorkerConfig::default(),
            status: StatusConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Config {
    /// Data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.data_directory)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("claimslion.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_data_directory() -> String {
    "~/.claimslion/data".to_string()
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return match path.strip_prefix("~/") {
                Some(rest) => home.join(rest),
                None => home,
            };
        }
    }
    PathBuf::from(path)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Largest accepted upload, inclusive.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["csv".to_string(), "xlsx".to_string()]
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Direct API key. Prefer `api_key_file` or `api_key_env_var` outside local testing.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_analysis_max_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f32,
    /// Rows submitted to the model; the remainder is reported as truncated.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Ceiling on the decompressed size of any single part read from an xlsx archive.
    #[serde(default = "default_max_expanded_bytes")]
    pub max_expanded_bytes: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Total model calls per job, including the first. Only transient failures are retried.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("ANTHROPIC_API_KEY".to_string())
}

fn default_analysis_max_tokens() -> u32 {
    4000
}

fn default_analysis_temperature() -> f32 {
    0.1
}

fn default_max_rows() -> usize {
    500
}

/// Ten times the default upload cap.
fn default_max_expanded_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            model: default_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            max_output_tokens: default_analysis_max_tokens(),
            temperature: default_analysis_temperature(),
            max_rows: default_max_rows(),
            max_expanded_bytes: default_max_expanded_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Upper bound on concurrent analysis calls.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_inter_task_delay_ms")]
    pub inter_task_delay_ms: u64,
}

fn default_max_in_flight() -> usize {
    5
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_inter_task_delay_ms() -> u64 {
    2000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            sweep_interval_secs: default_sweep_interval_secs(),
            inter_task_delay_ms: default_inter_task_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Hard ceiling for any wait on a job.
    #[serde(default = "default_wait_ceiling_secs")]
    pub wait_ceiling_secs: u64,
    #[serde(default = "default_wait_secs")]
    pub default_wait_secs: u64,
}

fn default_wait_ceiling_secs() -> u64 {
    300
}

fn default_wait_secs() -> u64 {
    30
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            wait_ceiling_secs: default_wait_ceiling_secs(),
            default_wait_secs: default_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    #[serde(default = "default_chat_max_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,
}

fn default_max_history_messages() -> usize {
    20
}

fn default_chat_max_tokens() -> u32 {
    500
}

fn default_chat_temperature() -> f32 {
    0.7
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history_messages(),
            max_output_tokens: default_chat_max_tokens(),
            temperature: default_chat_temperature(),
        }
    }
}
