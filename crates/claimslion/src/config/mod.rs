pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, load_config, load_config_from_str, load_config_with_env,
    resolve_api_key,
};
pub use schema::{
    AnalysisConfig, ChatConfig, Config, IntakeConfig, LogFormat, ServerConfig, StatusConfig,
    WorkerConfig,
};
