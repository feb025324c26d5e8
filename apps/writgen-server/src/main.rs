//! Writ Petition generation server
//!
//! Fills the Writ Petition Word template from a submitted form and returns
//! the finished `.docx`. Provides REST API endpoints for:
//!
//! - Template listing and field schemas
//! - Document generation (CSRF-protected)
//! - Re-download of recently generated documents
//!
//! ## Architecture
//!
//! The server is a thin host around `docx-engine`: requests are checked here,
//! generation runs on the blocking pool, and a background task sweeps
//! generated documents once their retention window has passed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use docx_engine::{ArtifactStore, Generator, TemplateRegistry};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod csrf;
mod error;

use api::AppState;
use config::{AppEnv, ConfigArgs, ServerConfig};
use csrf::CsrfGuard;

/// Command-line arguments for the writ petition server
#[derive(Parser, Debug)]
#[command(name = "writgen-server")]
#[command(about = "Writ Petition document generation server")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh value for SECRET_KEY and exit
    GenerateSecret,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Some(Command::GenerateSecret) = args.command {
        println!("{}", config::generate_secret()?);
        return Ok(());
    }

    // Initialize logging
    let log_level = if args.config.verbose || args.config.environment == AppEnv::Development {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_args(args.config)?;
    info!(
        "Starting writgen server on {}:{} ({:?})",
        config.host, config.port, config.environment
    );
    if config.debug_logging() {
        info!("Debug logging enabled");
    }

    let registry = TemplateRegistry::builtin(&config.template_dir);
    for descriptor in registry.list() {
        if !descriptor.template_path.is_file() {
            warn!(
                "Template file for {} missing at {}",
                descriptor.key,
                descriptor.template_path.display()
            );
        }
    }
    let store = ArtifactStore::new(&config.temp_dir, config.retention)?;
    let generator = Arc::new(Generator::new(registry, store));

    match config.sweep_interval {
        Some(every) => spawn_sweeper(Arc::clone(&generator), every),
        None => info!("Background sweep disabled"),
    }

    // Create shared state
    let state = AppState {
        generator,
        csrf: CsrfGuard::new(&config.secret_key, config.csrf_time_limit),
        csrf_enabled: config.csrf_enabled,
        purge_after_download: config.purge_after_download,
    };
    if !state.csrf_enabled {
        warn!("CSRF protection disabled ({:?} environment)", config.environment);
    }

    let app = api::router(state, config.max_content_length);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Templates: {}", config.template_dir.display());
    info!(
        "Generated documents: {} (kept {}h)",
        config.temp_dir.display(),
        config.retention.num_hours()
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Sweep expired documents every `every`, starting immediately so files left
/// by a previous run are collected at startup
fn spawn_sweeper(generator: Arc<Generator>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let generator = Arc::clone(&generator);
            if let Err(err) = tokio::task::spawn_blocking(move || generator.sweep(Utc::now())).await
            {
                warn!("Sweep task failed: {}", err);
            }
        }
    });
}
