//! Equipment Photo Pro - CLI
//!
//! Runs the API server and a few maintenance commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use equipment_photo_pro::config::ServerConfig;
use equipment_photo_pro::state::{build_auth, AppState};
use equipment_photo_pro::{api, logging, sweeper};

#[derive(Parser)]
#[command(name = "photo-pro")]
#[command(version = equipment_photo_pro::VERSION)]
#[command(about = "Equipment Photo Pro - AI photo enhancement for equipment dealers")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,

    /// Create an admin account or promote an existing one
    SetupAdmin {
        /// Admin email address
        email: String,
    },

    /// Delete expired uploads, sessions and codes
    Cleanup,

    /// Print account and processing totals
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init(cli.verbose, config.log_json);

    match cli.command {
        Commands::Serve => serve(config).await,

        Commands::SetupAdmin { email } => {
            let auth = build_auth(&config)?;
            let created = auth.promote_admin(&email)?;
            if created {
                println!("Created admin account: {email}");
            } else {
                println!("Granted admin access to existing account: {email}");
            }
            Ok(())
        }

        Commands::Cleanup => {
            let state = AppState::from_config(&config)?;
            let retention = Duration::from_secs(config.retention_minutes * 60);
            let summary = sweeper::run_once(&state, retention)?;
            println!("Uploads removed:  {}", summary.uploads.removed);
            println!("Uploads kept:     {}", summary.uploads.kept);
            println!("Sessions removed: {}", summary.auth.sessions_removed);
            println!("Codes removed:    {}", summary.auth.codes_removed);
            Ok(())
        }

        Commands::Stats => {
            let auth = build_auth(&config)?;
            let stats = auth.admin_stats()?;
            println!("Total users:            {}", stats.totals.total_users);
            println!("Images processed:       {}", stats.totals.total_images_processed);
            println!("Active users (30 days): {}", stats.totals.active_users_30_days);
            println!("{:-<60}", "");
            for user in &stats.users {
                println!(
                    "{:>5}  {:<32} {:>6} {:<10}{}",
                    user.id,
                    user.email,
                    user.images_processed_count,
                    user.subscription_status.as_str(),
                    if user.is_admin { " admin" } else { "" }
                );
            }
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);

    let retention = Duration::from_secs(config.retention_minutes * 60);
    let every = Duration::from_secs(config.sweep_interval_minutes.max(1) * 60);
    let sweeper = sweeper::spawn(state.clone(), retention, every);

    let app = api::router(state, &config.cors_origins);

    let address = config.bind_addr()?;
    let listener = TcpListener::bind(address.as_str())
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    let local = listener.local_addr().context("listener has no local address")?;
    info!(%address, %local, "Equipment Photo Pro API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
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
}
