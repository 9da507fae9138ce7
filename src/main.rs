//! B2B Import Worker - Excel bulk import of B2B orders
//!
//! The worker serves the import pipeline over NATS. The client subcommands
//! drive the same pipeline from the command line.

mod auth;
mod cli;
mod config;
mod db;
mod handlers;
mod services;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::cli::{Cli, ClientArgs, Command};
use crate::config::Config;
use crate::services::intake::content_type_for_path;
use crate::services::order_store::{create_order_store, OrderStore};
use crate::services::session::{NatsImportApi, TracingNotifier, UploadSession};
use crate::types::{ImportOptions, UploadFile};

type CliSession = UploadSession<NatsImportApi, TracingNotifier>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "b2b-import-worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,b2b_import_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let pool = db::create_pool(config.require_database_url()?).await?;
            db::run_migrations(&pool).await
        }
        Command::Template { format, out_dir, client } => {
            let session = client_session(&config, &client).await?;
            let path = session.download_template(format, client.mode, &out_dir).await?;
            println!("Saved {}", path.display());
            Ok(())
        }
        Command::Preview { file, client } => {
            let session = client_session(&config, &client).await?;
            session.select_file(load_file(&file).await?)?;
            session.preview().await?;
            if let Some(rendered) = session.render_preview() {
                println!("{}", rendered);
            }
            Ok(())
        }
        Command::Import { file, skip_invalid, create_customers, client } => {
            let session = client_session(&config, &client).await?;
            session.select_file(load_file(&file).await?)?;
            session.preview().await?;
            if let Some(rendered) = session.render_preview() {
                println!("{}", rendered);
            }

            let options = ImportOptions { skip_invalid, create_customers, import_mode: client.mode };
            session.import(options).await?;
            if let Some(rendered) = session.render_result() {
                println!("{}", rendered);
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting B2B Import Worker...");

    let pool = if config.store_backend == "postgres" {
        let pool = db::create_pool(config.require_database_url()?).await?;
        info!("Connected to PostgreSQL");
        db::run_migrations(&pool).await?;
        Some(pool)
    } else {
        None
    };
    let store: Arc<dyn OrderStore> = Arc::from(create_order_store(&config.store_backend, pool)?);

    let nats_client = connect_nats(&config).await?;
    info!("Connected to NATS at {}", config.nats_url);

    // Start message handlers
    let handler_result = handlers::start_handlers(nats_client, store, &config).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth)
async fn connect_nats(config: &Config) -> Result<async_nats::Client> {
    let client = match (&config.nats_user, &config.nats_password) {
        (Some(user), Some(password)) => {
            async_nats::ConnectOptions::new()
                .user_and_password(user.clone(), password.clone())
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    Ok(client)
}

async fn client_session(config: &Config, args: &ClientArgs) -> Result<CliSession> {
    let token = match &args.token {
        Some(token) => token.clone(),
        None => auth::generate_token(Uuid::nil(), "cli@localhost", "admin", &[], &config.jwt_secret)?,
    };
    let client = connect_nats(config).await?;
    Ok(UploadSession::new(
        NatsImportApi::new(client, token),
        TracingNotifier,
        args.mode,
        config.max_upload_bytes,
        config.excel_helper_url.clone(),
    ))
}

async fn load_file(path: &Path) -> Result<UploadFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = content_type_for_path(path).unwrap_or("application/octet-stream");
    Ok(UploadFile::new(filename, content_type, bytes))
}
