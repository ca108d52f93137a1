//! CLI command definitions

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gatekeep")]
#[command(about = "Request gatekeeping: signed tokens, revocation, grants and admission control", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config file; falls back to GATEKEEP_* environment variables
    #[arg(short, long, env = "GATEKEEP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gatekeeper and its background sweeps
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:8080", env = "GATEKEEP_BIND")]
        bind: String,

        /// JSON file of grants, reloadable via the admin endpoint
        #[arg(long, env = "GATEKEEP_GRANTS")]
        grants: Option<PathBuf>,

        /// Admin key enabling the admin endpoints
        #[arg(long, env = "GATEKEEP_ADMIN_KEY")]
        admin_key: Option<String>,
    },

    /// Issue a signed token
    ///
    /// Examples:
    ///   gatekeep issue --subject 42 --tenant users --role editor --rate-budget 5
    ///   gatekeep issue --subject 7 --tenant services --role batch --rate-budget 50 \
    ///       --valid-until 2030-01-01T00:00:00Z
    Issue {
        /// Subject identifier
        #[arg(long)]
        subject: String,

        /// Tenant type the subject belongs to
        #[arg(long)]
        tenant: String,

        /// Role granted to the subject
        #[arg(long)]
        role: String,

        /// Allowed requests per second
        #[arg(long, default_value_t = 1.0)]
        rate_budget: f64,

        /// Start of validity (RFC 3339), defaults to now
        #[arg(long)]
        valid_from: Option<DateTime<Utc>>,

        /// End of validity (RFC 3339), defaults to the maximum token lifetime
        #[arg(long)]
        valid_until: Option<DateTime<Utc>>,
    },

    /// Verify a token and print its payload
    Decode {
        /// Token in wire form
        token: String,
    },

    /// Print a random signing secret
    Keygen,
}
