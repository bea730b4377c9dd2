use std::path::PathBuf;
use std::sync::Arc;

use ambient_core::{Clock, Messenger, SystemClock};
use ambient_engine::{AccessPolicy, Companion, CompanionDeps, CycleScheduler, EngineConfig};
use ambient_llm::{OpenRouterClient, OpenRouterConfig, ReliableCompletion, ReliableConfig};
use ambient_server::{AppState, DisabledMessenger, ServerConfig, TelegramMessenger};
use ambient_settings::{load_settings_from_path, settings_path, AmbientSettings};
use ambient_store::MemoryStore;
use ambient_telemetry::{init_telemetry, TelemetryConfig};
use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "ambient", about = "Ambient companion with persistent memory")]
struct Cli {
    /// Settings file (defaults to $AMBIENT_SETTINGS or <data dir>/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Override the HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn completion_service(settings: &AmbientSettings) -> anyhow::Result<ReliableCompletion<OpenRouterClient>> {
    let api_key = settings
        .credentials
        .completion_api_key
        .clone()
        .context("AMBIENT_COMPLETION_API_KEY (or OPENROUTER_API_KEY) is not set")?;
    let models = &settings.models;
    let client = OpenRouterClient::new(
        api_key.0,
        OpenRouterConfig {
            base_url: models.base_url.clone(),
            cheap_model: models.cheap.clone(),
            quality_model: models.quality.clone(),
        },
    )?;
    let reliability = ReliableConfig {
        max_retries: models.max_retries,
        base_delay: std::time::Duration::from_millis(models.base_delay_ms),
        max_delay: std::time::Duration::from_millis(models.max_delay_ms),
        request_timeout: models.request_timeout(),
        ..Default::default()
    };
    Ok(ReliableCompletion::new(client, reliability))
}

fn messenger(settings: &AmbientSettings) -> anyhow::Result<Arc<dyn Messenger>> {
    match &settings.credentials.telegram_bot_token {
        Some(token) => Ok(Arc::new(TelegramMessenger::new(
            token.0.clone(),
            settings.telegram.api_base.clone(),
        )?)),
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, outbound messages are disabled");
            Ok(Arc::new(DisabledMessenger))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.settings.unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path).with_context(|| format!("loading settings from {}", path.display()))?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    std::fs::create_dir_all(&settings.storage.data_dir)
        .with_context(|| format!("creating data dir {}", settings.storage.data_dir.display()))?;

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: TelemetryConfig::level_from_str(&settings.logging.level),
        module_levels: Vec::new(),
        log_to_sqlite: settings.logging.log_to_sqlite,
        log_db_path: settings.storage.log_db_path(),
    });
    tracing::info!(settings = %path.display(), "starting ambient companion");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db_path = settings.storage.memory_db_path();
    let store = MemoryStore::open(&db_path, clock.now()).context("opening memory store")?;
    tracing::info!(path = %db_path.display(), "memory store opened");

    let messenger = messenger(&settings)?;
    let companion = Arc::new(Companion::new(
        CompanionDeps {
            completion: Arc::new(completion_service(&settings)?),
            store,
            messenger: messenger.clone(),
            clock,
        },
        EngineConfig::from(&settings),
        AccessPolicy::from(&settings.telegram),
    )?);

    let cancel = CancellationToken::new();
    let scheduler = CycleScheduler::new(companion.autonomy(), cancel.clone()).spawn();

    let server = ambient_server::start(
        ServerConfig::from(&settings.server),
        AppState {
            companion: companion.clone(),
            messenger,
        },
        cancel.clone(),
    )
    .await
    .context("starting HTTP server")?;
    tracing::info!(port = server.port, "ambient companion ready");

    if settings.autonomy.startup_greeting {
        companion.startup_greeting().await;
    }

    tokio::signal::ctrl_c().await.context("listening for ctrl+c")?;
    tracing::info!("shutting down");

    cancel.cancel();
    let _ = scheduler.await;
    server.stopped().await;
    companion.wait_for_synthesis().await;
    tracing::info!("shutdown complete");
    Ok(())
}
