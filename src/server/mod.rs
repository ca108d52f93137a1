//! HTTP surface for the gatekeeping core
//!
//! A thin axum adapter: the middleware runs [`AuthPipeline`] on each request
//! and maps rejections to status codes. The server also owns the two
//! background sweeps for the lifetime of the listener.

pub mod middleware;
mod routes;

pub use middleware::{bearer_token, rejection_response, require_auth};
pub use routes::{create_router, ADMIN_KEY_HEADER};

use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use crate::auth::AdminKey;
use crate::clock::{Clock, SystemClock};
use crate::pipeline::AuthPipeline;
use crate::storage::GrantSource;
use crate::sweep::SweepTask;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AuthPipeline>,
    pub grant_source: Option<Arc<dyn GrantSource>>,
    pub admin_key: Option<AdminKey>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(pipeline: Arc<AuthPipeline>) -> Self {
        Self {
            pipeline,
            grant_source: None,
            admin_key: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_grant_source(mut self, source: Arc<dyn GrantSource>) -> Self {
        self.grant_source = Some(source);
        self
    }

    pub fn with_admin_key(mut self, key: AdminKey) -> Self {
        self.admin_key = Some(key);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Server configuration
pub struct GatekeepServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Interval between revocation sweeps
    pub revocation_sweep: Duration,
    /// Interval between admission sweeps
    pub admission_sweep: Duration,
}

/// HTTP server plus its background sweeps
pub struct GatekeepServer {
    config: GatekeepServerConfig,
    state: AppState,
}

impl GatekeepServer {
    pub fn new(config: GatekeepServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then stop the sweeps
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pipeline = &self.state.pipeline;
        let revocation_sweep = SweepTask::start(
            pipeline.revocations().clone(),
            self.config.revocation_sweep,
            self.state.clock.clone(),
        );
        let admission_sweep = SweepTask::start(
            pipeline.admission().clone(),
            self.config.admission_sweep,
            self.state.clock.clone(),
        );

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;

        info!(addr = %self.config.bind_addr, "Gatekeep server listening");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error");

        revocation_sweep.stop().await;
        admission_sweep.stop().await;

        served
    }
}
