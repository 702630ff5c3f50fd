// src/main.rs
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod auth;
mod config;
mod hours;
mod http;
mod schedule;
mod store;

#[cfg(test)]
mod http_tests;

use auth::{issue_token, JwtAuthenticator};
use config::Config;
use hours::DayEntry;
use http::AppState;
use schedule::ScheduleService;
use store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "shiftbook", version, about = "Weekly work-schedule hours service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print a bearer token signed with JWT_SECRET, for development
    IssueToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        email: String,
        /// Lifetime in hours, defaults to JWT_EXPIRATION_HOURS
        #[arg(long)]
        hours: Option<u64>,
    },
    /// Re-derive the stored totals of one schedule from its saved days
    Recalculate { schedule_id: Uuid },
    /// Compute totals for a JSON array of day entries without storing anything
    Preview { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(load_config()?).await,
        Command::IssueToken {
            user_id,
            email,
            hours,
        } => {
            let config = load_config()?;
            let ttl = hours.unwrap_or(config.jwt_expiration_hours);
            let token = issue_token(config.jwt_secret_bytes(), &user_id, &email, ttl)
                .context("Failed to sign token")?;
            println!("{}", token);
            Ok(())
        }
        Command::Recalculate { schedule_id } => {
            let config = load_config()?;
            let service = build_service(&config).await?.0;
            let schedule = service
                .recalculate(schedule_id)
                .await
                .with_context(|| format!("Failed to recalculate schedule {}", schedule_id))?;
            println!("{}", serde_json::to_string_pretty(&schedule)?);
            Ok(())
        }
        Command::Preview { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let days: Vec<DayEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of day entries", file.display()))?;
            // Preview needs neither storage nor secrets
            let summary = schedule::check_days(&days);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.is_valid() {
                anyhow::bail!("{} contains invalid day entries", file.display());
            }
            Ok(())
        }
    }
}

fn load_config() -> Result<Config> {
    Config::from_env().context("Failed to load configuration from environment")
}

async fn build_service(config: &Config) -> Result<(Arc<ScheduleService>, Arc<SqliteStore>)> {
    let store = Arc::new(
        SqliteStore::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?,
    );
    let service = Arc::new(ScheduleService::new(
        store.clone(),
        store.clone(),
        config.schedule_rules(),
    ));
    Ok((service, store))
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting shiftbook API server");
    let (schedules, store) = build_service(&config).await?;

    let state = AppState {
        schedules,
        authenticator: Arc::new(JwtAuthenticator::new(config.jwt_secret_bytes(), store)),
    };
    let app = http::router(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .context("Failed to load TLS cert/key")?;
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Listening on http://{}", addr);
            axum::serve(listener, app).await.context("HTTP server failed")?;
        }
    }

    Ok(())
}
