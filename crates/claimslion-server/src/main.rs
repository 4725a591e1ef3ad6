use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use claimslion::config::LogFormat;
use claimslion::{
    load_config_with_env, resolve_api_key, AnthropicClient, ChatService, Database, JobLifecycle,
    LocalContentStore, TextGenerator,
};
use claimslion_server::error::ServerError;
use claimslion_server::logging::init_logging;
use claimslion_server::{serve, shutdown_signal, AppState};

#[derive(Parser)]
#[command(name = "claimslion-server")]
#[command(version, about = "Claims spreadsheet analysis API", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "CLAIMSLION_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(short, long)]
    listen: Option<String>,

    /// Directory for the database and stored uploads
    #[arg(long)]
    data_dir: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("claimslion-server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let mut config = load_config_with_env(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_directory = data_dir;
    }
    if let Some(format) = cli.log_format {
        config.server.log_format = format.into();
    }

    init_logging(config.server.log_format)?;

    let db = Database::open(&config.database_path())?;
    let store = Arc::new(LocalContentStore::new(config.uploads_dir()));
    let api_key = resolve_api_key(&config.analysis)?;
    let generator: Arc<dyn TextGenerator> =
        Arc::new(AnthropicClient::from_config(&config.analysis, api_key)?);

    let lifecycle = JobLifecycle::new(&config, db.clone(), store, Arc::clone(&generator));
    let chat = ChatService::new(db, generator, config.chat.clone());

    let shutdown = CancellationToken::new();
    let sweeper = lifecycle.sweeper().spawn(shutdown.clone());
    let state = AppState::new(lifecycle, chat, shutdown.clone());

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    log::info!(
        "ClaimsLion listening on http://{} (model {})",
        listener.local_addr()?,
        config.analysis.model
    );

    serve(listener, state, shutdown_signal()).await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        log::error!("Queue sweeper task failed: {}", e);
    }
    log::info!("Server shut down");
    Ok(())
}
