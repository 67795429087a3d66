use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reviewdesk::clock::{Clock, SystemClock};
use reviewdesk::config::Config;
use reviewdesk::notifications::{DbNotifier, Notifier};
use reviewdesk::AppState;

#[derive(Parser, Debug)]
#[command(name = "reviewdesk")]
#[command(author, version, about = "Research proposal review service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "reviewdesk.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Token signing secret, overrides `auth.jwt_secret`
    #[arg(long, env = "REVIEWDESK_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reviewdesk v{}", env!("CARGO_PKG_VERSION"));

    if let Some(secret) = cli.jwt_secret {
        config.auth.jwt_secret = secret;
    }
    if config.auth.ensure_secret() {
        tracing::warn!(
            "No jwt_secret configured; generated a random one. Issued tokens will not survive a restart"
        );
    }

    let db = reviewdesk::db::init(&config.server.data_dir)
        .await
        .context("Failed to initialize database")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    reviewdesk::auth::ensure_admin_user(&db, &config.auth, clock.as_ref()).await?;

    let notifier: Arc<dyn Notifier> = Arc::new(DbNotifier::new(db.clone(), clock.clone()));
    let addr = format!("{}:{}", config.server.host, config.server.api_port);
    let state = Arc::new(AppState::new(config, db, clock, notifier));

    let app = reviewdesk::api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
