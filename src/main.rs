use anyhow::{Context, Result};
use avatar_recorder::transport::live_connector;
use avatar_recorder::{
    create_router, AppState, Config, CreateSessionOptions, RoomConnector, SessionClient,
    SessionConfig, TaskKind, TaskOrchestrator,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "avatar-recorder", version, about = "Record streaming avatar responses to video files")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/avatar-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a session, speak TEXT once and save the recording
    Speak {
        text: String,

        /// Treat the text as conversational input instead of repeating it
        #[arg(long)]
        chat: bool,

        /// Override the configured avatar
        #[arg(long)]
        avatar: Option<String>,
    },
    /// List sessions visible to the API key
    Sessions,
    /// Close every session visible to the API key
    Sweep,
    /// List available avatars
    Avatars,
    /// Open a session and serve the HTTP control API until Ctrl-C
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    cfg.validate()?;

    info!("avatar-recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Control API: {}", cfg.api.base_url);

    match cli.command {
        Command::Speak { text, chat, avatar } => speak(&cfg, &text, chat, avatar).await,
        Command::Sessions => {
            let client = SessionClient::new(SessionConfig::from_config(&cfg))?;
            let sessions = client.list_active_sessions().await;
            info!("{} active sessions", sessions.len());
            println!("{}", serde_json::to_string_pretty(&sessions)?);
            Ok(())
        }
        Command::Sweep => {
            let client = SessionClient::new(SessionConfig::from_config(&cfg))?;
            let closed = client.close_all_active_sessions().await;
            info!("Closed {} sessions", closed);
            Ok(())
        }
        Command::Avatars => {
            let client = SessionClient::new(SessionConfig::from_config(&cfg))?;
            let avatars = client.list_avatars().await;
            println!("{}", serde_json::to_string_pretty(&avatars)?);
            Ok(())
        }
        Command::Serve => serve(&cfg).await,
    }
}

fn room_connector() -> Result<Arc<dyn RoomConnector>> {
    live_connector().context("Cannot record without a media room transport")
}

async fn speak(cfg: &Config, text: &str, chat: bool, avatar: Option<String>) -> Result<()> {
    let orchestrator = TaskOrchestrator::from_config(cfg, room_connector()?)?;

    let options = CreateSessionOptions {
        avatar_id: avatar,
        ..Default::default()
    };
    if let Err(e) = orchestrator.open_session(options).await {
        orchestrator.shutdown().await;
        return Err(e).context("Failed to open avatar session");
    }

    let kind = if chat { TaskKind::Chat } else { TaskKind::Repeat };

    let result = tokio::select! {
        result = orchestrator.process_text_task(text, kind) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cleaning up");
            None
        }
    };

    orchestrator.shutdown().await;

    match result {
        Some(Ok(Some(path))) => {
            info!("Recording saved");
            println!("{}", path.display());
            Ok(())
        }
        Some(Ok(None)) => anyhow::bail!("Task failed, see log for details"),
        Some(Err(e)) => Err(e.into()),
        None => Ok(()),
    }
}

async fn serve(cfg: &Config) -> Result<()> {
    let orchestrator = Arc::new(TaskOrchestrator::from_config(cfg, room_connector()?)?);

    if let Err(e) = orchestrator.open_session(CreateSessionOptions::default()).await {
        orchestrator.shutdown().await;
        return Err(e).context("Failed to open avatar session");
    }

    let app = create_router(AppState::new(orchestrator.clone()));
    let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP control API listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutdown requested");
        })
        .await;

    orchestrator.shutdown().await;
    served.context("HTTP server failed")
}
