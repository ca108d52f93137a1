//! Gatekeep CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use gatekeep::auth::{AdminKey, Identity, TokenCodec, TokenSecret};
use gatekeep::config::GatekeepConfig;
use gatekeep::pipeline::AuthPipeline;
use gatekeep::server::{AppState, GatekeepServer, GatekeepServerConfig};
use gatekeep::storage::JsonGrantFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { bind, grants, admin_key } => {
            serve(load_config(config_path)?, bind, grants, admin_key).await
        }
        Commands::Issue {
            subject,
            tenant,
            role,
            rate_budget,
            valid_from,
            valid_until,
        } => {
            let codec = TokenCodec::from_config(&load_config(config_path)?);
            let now = Utc::now();
            let identity = Identity {
                subject_id: subject,
                tenant_type: tenant,
                role,
                rate_budget,
                valid_from: valid_from.unwrap_or(now),
                valid_until: valid_until.unwrap_or(now + codec.max_lifetime()),
            };
            issue(&codec, &identity)
        }
        Commands::Decode { token } => decode(&load_config(config_path)?, &token),
        Commands::Keygen => {
            println!("{}", TokenSecret::generate());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<GatekeepConfig> {
    match path {
        Some(path) => GatekeepConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => GatekeepConfig::from_env().context("GATEKEEP_SECRET or --config required"),
    }
}

async fn serve(
    config: GatekeepConfig,
    bind: String,
    grants_path: Option<PathBuf>,
    admin_key: Option<String>,
) -> Result<()> {
    let bind_addr = bind.parse().context("Invalid bind address")?;
    let pipeline = Arc::new(AuthPipeline::from_config(&config).context("Invalid configuration")?);

    let mut state = AppState::new(pipeline.clone());

    if let Some(path) = grants_path {
        let source = Arc::new(JsonGrantFile::new(&path));
        let snapshot = pipeline
            .grants()
            .reload_from(source.as_ref())
            .await
            .with_context(|| format!("Failed to load grants: {}", path.display()))?;
        info!(grants = snapshot.len(), path = %path.display(), "Loaded grants");
        state = state.with_grant_source(source);
    } else {
        info!("No grant file given, every request will be forbidden until grants are loaded");
    }

    if let Some(key) = admin_key {
        state = state.with_admin_key(AdminKey::new(key));
    }

    let server_config = GatekeepServerConfig {
        bind_addr,
        revocation_sweep: config.revocation_sweep_interval(),
        admission_sweep: config.admission.clean_up_cycle(),
    };

    info!("Starting Gatekeep server...");
    GatekeepServer::new(server_config, state)
        .run(shutdown_signal())
        .await?;

    info!("Gatekeep server stopped");
    Ok(())
}

fn issue(codec: &TokenCodec, identity: &Identity) -> Result<()> {
    let token = codec.issue(identity, Utc::now()).context("Failed to issue token")?;
    let payload = token.payload();

    println!("{}", token);
    println!();
    println!("Subject: {}", payload.subject());
    println!("Role: {}", payload.role);
    println!("Rate budget: {}/s", payload.rate_budget);
    println!("Valid: {} .. {}", payload.issued_at, payload.expires_at);

    Ok(())
}

fn decode(config: &GatekeepConfig, token: &str) -> Result<()> {
    let codec = TokenCodec::from_config(config);
    let payload = codec.decode(token.trim(), Utc::now()).context("Token rejected")?;

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
