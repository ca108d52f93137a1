//! Startup configuration
//!
//! Loaded from a JSON file or `GATEKEEP_*` environment variables, then
//! validated once. An out-of-range value is fatal: neither the admission
//! controller nor the revocation registry can be built from it.

use crate::auth::TokenSecret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Accepted range for the rate window size
pub const PRECISION_RANGE: (usize, usize) = (3, 10);
/// Accepted range for the admission sweep interval, in minutes
pub const CLEAN_UP_CYCLE_RANGE: (u64, u64) = (1, 10);
/// Accepted range for the penalty multiplier
pub const PENALTY_FACTOR_RANGE: (f64, f64) = (0.0, 10.0);
/// Accepted range for the number of idle sweep cycles before a window is dropped
pub const IDLE_CYCLES_RANGE: (u32, u32) = (1, 10);

const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
const DEFAULT_REVOCATION_SWEEP_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("precision must be between {min} and {max}, got {got}")]
    PrecisionOutOfRange { min: usize, max: usize, got: usize },

    #[error("clean up cycle must be between {min} and {max} minutes, got {got}")]
    CleanUpCycleOutOfRange { min: u64, max: u64, got: u64 },

    #[error("penalty factor must be between {min} and {max}, got {got}")]
    PenaltyFactorOutOfRange { min: f64, max: f64, got: f64 },

    #[error("idle cycles must be between {min} and {max}, got {got}")]
    IdleCyclesOutOfRange { min: u32, max: u32, got: u32 },

    #[error("token lifetime must be positive")]
    InvalidTokenLifetime,

    #[error("revocation sweep interval must be positive")]
    InvalidSweepInterval,

    #[error("token signing secret is empty")]
    MissingSecret,

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Rate estimation and penalty settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Number of timestamps kept per subject
    pub precision: usize,
    /// Minutes between admission sweeps
    pub clean_up_cycle_minutes: u64,
    /// Penalty minutes per unit of budget overshoot
    pub penalty_factor: f64,
    /// Sweep cycles a subject must stay idle before it is forgotten
    pub idle_cycles: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            precision: 5,
            clean_up_cycle_minutes: 1,
            penalty_factor: 1.0,
            idle_cycles: 1,
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = PRECISION_RANGE;
        if self.precision < min || self.precision > max {
            return Err(ConfigError::PrecisionOutOfRange {
                min,
                max,
                got: self.precision,
            });
        }

        let (min, max) = CLEAN_UP_CYCLE_RANGE;
        if self.clean_up_cycle_minutes < min || self.clean_up_cycle_minutes > max {
            return Err(ConfigError::CleanUpCycleOutOfRange {
                min,
                max,
                got: self.clean_up_cycle_minutes,
            });
        }

        // NaN fails both comparisons, so test for containment instead
        let (min, max) = PENALTY_FACTOR_RANGE;
        if !(min..=max).contains(&self.penalty_factor) {
            return Err(ConfigError::PenaltyFactorOutOfRange {
                min,
                max,
                got: self.penalty_factor,
            });
        }

        let (min, max) = IDLE_CYCLES_RANGE;
        if self.idle_cycles < min || self.idle_cycles > max {
            return Err(ConfigError::IdleCyclesOutOfRange {
                min,
                max,
                got: self.idle_cycles,
            });
        }

        Ok(())
    }

    /// Interval between admission sweeps
    pub fn clean_up_cycle(&self) -> Duration {
        Duration::from_secs(self.clean_up_cycle_minutes * 60)
    }

    /// How long a subject must be inactive before its window can be dropped
    pub fn idle_window(&self) -> chrono::Duration {
        chrono::Duration::minutes((self.clean_up_cycle_minutes * u64::from(self.idle_cycles)) as i64)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatekeepConfig {
    /// HMAC signing secret
    pub secret: TokenSecret,

    /// Upper bound on any token's lifetime
    #[serde(default = "default_token_lifetime")]
    pub max_token_lifetime_secs: u64,

    /// Seconds between revocation sweeps
    #[serde(default = "default_revocation_sweep")]
    pub revocation_sweep_secs: u64,

    #[serde(default)]
    pub admission: AdmissionConfig,
}

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_revocation_sweep() -> u64 {
    DEFAULT_REVOCATION_SWEEP_SECS
}

impl GatekeepConfig {
    /// Build a config with defaults around the given secret
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: TokenSecret::new(secret),
            max_token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            revocation_sweep_secs: DEFAULT_REVOCATION_SWEEP_SECS,
            admission: AdmissionConfig::default(),
        }
    }

    /// Read and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON document
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `GATEKEEP_*` environment variables
    ///
    /// `GATEKEEP_SECRET` is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = std::env::var("GATEKEEP_SECRET").map_err(|_| ConfigError::MissingSecret)?;
        let mut config = Self::new(secret);

        if let Some(v) = env_parse("GATEKEEP_TOKEN_LIFETIME_SECS")? {
            config.max_token_lifetime_secs = v;
        }
        if let Some(v) = env_parse("GATEKEEP_REVOCATION_SWEEP_SECS")? {
            config.revocation_sweep_secs = v;
        }
        if let Some(v) = env_parse("GATEKEEP_PRECISION")? {
            config.admission.precision = v;
        }
        if let Some(v) = env_parse("GATEKEEP_CLEAN_UP_CYCLE_MINUTES")? {
            config.admission.clean_up_cycle_minutes = v;
        }
        if let Some(v) = env_parse("GATEKEEP_PENALTY_FACTOR")? {
            config.admission.penalty_factor = v;
        }
        if let Some(v) = env_parse("GATEKEEP_IDLE_CYCLES")? {
            config.admission.idle_cycles = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.max_token_lifetime_secs == 0 || self.max_token_lifetime_secs > i64::MAX as u64 / 1000 {
            return Err(ConfigError::InvalidTokenLifetime);
        }
        if self.revocation_sweep_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval);
        }
        self.admission.validate()
    }

    pub fn max_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_token_lifetime_secs as i64)
    }

    pub fn revocation_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.revocation_sweep_secs)
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}
