//! Gatekeep - request gatekeeping core for HTTP APIs
//!
//! Every inbound request passes through four gates before it reaches business
//! logic: a stateless HMAC-signed bearer token, a per-subject revocation
//! marker, a time-windowed `(role, route, method)` grant table, and a
//! sliding-window admission controller that penalises subjects exceeding their
//! rate budget.

pub mod admission;
pub mod auth;
pub mod clock;
pub mod config;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod subject;
pub mod sweep;

pub use admission::AdmissionController;
pub use auth::{Grant, GrantTable, Identity, Payload, RevocationRegistry, Token, TokenCodec, TokenError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AdmissionConfig, ConfigError, GatekeepConfig};
pub use pipeline::{AccessRequest, AuthPipeline, ForbiddenReason, Rejection};
pub use subject::SubjectKey;
