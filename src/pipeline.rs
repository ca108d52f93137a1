//! Per-request gatekeeping
//!
//! Four gates in a fixed order, no retries:
//!
//! 1. decode the bearer token (malformed, tampered, expired)
//! 2. check the subject's revocation marker
//! 3. look up the `(role, route, method)` grant
//! 4. record the request with the admission controller
//!
//! The first failing gate decides the outcome. A request that passes all four
//! yields the verified token payload.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::admission::AdmissionController;
use crate::auth::{GrantStatus, GrantTable, Payload, RevocationRegistry, TokenCodec, TokenError};
use crate::config::{ConfigError, GatekeepConfig};

/// Why a grant check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// No grant for the role on this route and method
    NoGrant,
    /// The grant exists but is expired or not yet valid
    OutsideWindow,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForbiddenReason::NoGrant => write!(f, "not enough permissions"),
            ForbiddenReason::OutsideWindow => write!(f, "role access expired or not yet valid"),
        }
    }
}

/// A terminal rejection from one of the gates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("malformed token")]
    MalformedToken,

    #[error("token tampered")]
    TamperedToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("token revoked")]
    RevokedToken,

    #[error("forbidden: {reason}")]
    Forbidden { reason: ForbiddenReason },

    #[error("rate limit exceeded, access void until {until}")]
    RateLimited { until: DateTime<Utc> },
}

impl Rejection {
    /// Stable machine-readable name
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::MalformedToken => "malformed_token",
            Rejection::TamperedToken => "tampered_token",
            Rejection::ExpiredToken => "expired_token",
            Rejection::RevokedToken => "revoked_token",
            Rejection::Forbidden { .. } => "forbidden",
            Rejection::RateLimited { .. } => "rate_limited",
        }
    }
}

impl From<TokenError> for Rejection {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Tampered => Rejection::TamperedToken,
            TokenError::Expired => Rejection::ExpiredToken,
            // Issue-side errors never come out of decode
            TokenError::Malformed
            | TokenError::EmptyValidity
            | TokenError::InvalidRateBudget
            | TokenError::Encoding(_) => Rejection::MalformedToken,
        }
    }
}

/// What is being asked for
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Raw token, without any `Bearer ` prefix
    pub bearer: &'a str,
    /// Route template, e.g. `/articles/{id}`
    pub route: &'a str,
    pub method: &'a str,
}

impl<'a> AccessRequest<'a> {
    pub fn new(bearer: &'a str, route: &'a str, method: &'a str) -> Self {
        Self {
            bearer,
            route,
            method,
        }
    }
}

/// Decode → revocation → grant → admission
#[derive(Debug, Clone)]
pub struct AuthPipeline {
    codec: TokenCodec,
    revocations: Arc<RevocationRegistry>,
    grants: Arc<GrantTable>,
    admission: Arc<AdmissionController>,
}

impl AuthPipeline {
    /// Assemble a pipeline around `codec`
    ///
    /// The revocation registry is built here from the codec's own lifetime cap,
    /// so a marker is never swept while a token it voids can still be live.
    pub fn new(
        codec: TokenCodec,
        grants: Arc<GrantTable>,
        admission: Arc<AdmissionController>,
    ) -> Result<Self, ConfigError> {
        let revocations = Arc::new(RevocationRegistry::new(codec.max_lifetime())?);
        Ok(Self {
            codec,
            revocations,
            grants,
            admission,
        })
    }

    /// Build every component from one validated config, with an empty grant table
    pub fn from_config(config: &GatekeepConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(
            TokenCodec::from_config(config),
            Arc::new(GrantTable::new()),
            Arc::new(AdmissionController::new(&config.admission)?),
        )
    }

    /// Run all four gates for `request` at `now`
    pub fn authorize(&self, request: &AccessRequest<'_>, now: DateTime<Utc>) -> Result<Payload, Rejection> {
        let payload = match self.codec.decode(request.bearer, now) {
            Ok(payload) => payload,
            Err(TokenError::Tampered) => {
                warn!(route = request.route, method = request.method, "Rejected tampered token");
                return Err(Rejection::TamperedToken);
            }
            Err(e) => {
                debug!(route = request.route, error = %e, "Rejected token");
                return Err(e.into());
            }
        };

        if self.revocations.is_revoked(&payload) {
            debug!(
                tenant = %payload.tenant_type,
                subject = %payload.subject_id,
                issued_at = %payload.issued_at,
                "Rejected revoked token"
            );
            return Err(Rejection::RevokedToken);
        }

        let reason = match self.grants.check(&payload.role, request.route, request.method, now) {
            GrantStatus::Active => None,
            GrantStatus::Missing => Some(ForbiddenReason::NoGrant),
            GrantStatus::OutsideWindow => Some(ForbiddenReason::OutsideWindow),
        };
        if let Some(reason) = reason {
            debug!(
                role = %payload.role,
                route = request.route,
                method = request.method,
                %reason,
                "Rejected by grant table"
            );
            return Err(Rejection::Forbidden { reason });
        }

        let penalty = self
            .admission
            .admit(&payload.tenant_type, &payload.subject_id, payload.rate_budget, now);
        if let Some(until) = penalty.filter(|until| *until > now) {
            debug!(
                tenant = %payload.tenant_type,
                subject = %payload.subject_id,
                until = %until,
                "Rejected by admission control"
            );
            return Err(Rejection::RateLimited { until });
        }

        Ok(payload)
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn revocations(&self) -> &Arc<RevocationRegistry> {
        &self.revocations
    }

    pub fn grants(&self) -> &Arc<GrantTable> {
        &self.grants
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }
}
