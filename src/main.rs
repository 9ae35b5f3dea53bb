#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use settings_sync::config::{FilePreferences, SyncConfig};
use settings_sync::device::{self, DeviceState};
use settings_sync::ipc::{self, DeviceServer};
use settings_sync::settings::FieldPath;
use settings_sync::sync::{self, DraftView, SessionHandle, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "settings-sync", version, about = "Synchronize settings with a device")]
struct Cli {
    /// Device socket (defaults to $XDG_RUNTIME_DIR/settings-sync/device.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Local preferences file
    #[arg(long, global = true)]
    preferences: Option<PathBuf>,

    /// Quiet period before local edits are committed
    #[arg(long, global = true)]
    commit_window_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a simulated device until interrupted
    Device,
    /// Print the synchronized settings
    Show,
    /// Change one setting and wait for the device to confirm it
    Set { path: String, value: String },
    /// Print settings every time they change
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = SyncConfig::from_env()?
        .with_socket(cli.socket)
        .with_preferences(cli.preferences)
        .with_commit_window_ms(cli.commit_window_ms);

    match cli.command {
        Command::Device => run_device(&config).await,
        Command::Show => {
            let session = start_session(&config).await?;
            let result = wait_for_sync(&session, &config).await.and_then(|view| print_view(&view));
            session.shutdown().await;
            result
        }
        Command::Set { path, value } => {
            let path: FieldPath = path.parse()?;
            let value = path.parse_value(&value)?;

            let session = start_session(&config).await?;
            let result = async {
                wait_for_sync(&session, &config).await?;
                let timeout = config.commit_window + config.response_timeout;
                let view = session
                    .set_field_confirmed(path, value, timeout)
                    .await
                    .context(format!("Failed to apply {path}"))?;
                info!(path = %path, commits = view.commits_sent, "Change settled");
                print_view(&view)
            }
            .await;
            session.shutdown().await;
            result
        }
        Command::Watch => {
            let session = start_session(&config).await?;
            let result = watch(&session).await;
            session.shutdown().await;
            result
        }
    }
}

async fn run_device(config: &SyncConfig) -> Result<()> {
    let server = DeviceServer::bind_to(config.socket_path.clone())?;
    let state = Arc::new(DeviceState::default());

    device::serve(server, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = ?e, "Failed to listen for Ctrl-C");
        }
    })
    .await
}

async fn start_session(config: &SyncConfig) -> Result<SessionHandle> {
    let connection = ipc::connect(&config.socket_path)
        .await
        .context(format!("Is a device running on {}?", config.socket_path.display()))?;

    let preferences = FilePreferences::new(config.preferences_path.clone());
    let engine = SyncEngine::start(connection.channel, Box::new(preferences), config.commit_window);
    Ok(sync::spawn(engine, connection.inbound))
}

async fn wait_for_sync(session: &SessionHandle, config: &SyncConfig) -> Result<DraftView> {
    let mut view = session.subscribe();
    let synced = tokio::time::timeout(config.response_timeout, view.wait_for(|v| v.is_synced()))
        .await
        .context("Timed out waiting for device settings")?
        .context("Sync session stopped before the device answered")?
        .clone();
    Ok(synced)
}

async fn watch(session: &SessionHandle) -> Result<()> {
    let mut view = session.subscribe();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = view.borrow_and_update().clone();
                print_view(&current)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}

fn print_view(view: &DraftView) -> Result<()> {
    let json = serde_json::to_string_pretty(&view.values).context("Failed to render settings")?;
    println!("{json}");
    Ok(())
}
