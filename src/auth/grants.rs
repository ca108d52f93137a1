//! Route grants
//!
//! A grant entitles a role to one `(route, method)` pair during a time window.
//! Routes are pre-resolved templates and only match exactly.
//!
//! The table is an immutable snapshot that is replaced wholesale on reload, so
//! readers never see a half-built table.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::storage::{GrantSource, StorageError};

/// Half-open validity window `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.from <= now && now < self.to
    }
}

/// Lookup key: `(role, route, method)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub role: String,
    pub route: String,
    pub method: String,
}

impl GrantKey {
    pub fn new(role: impl Into<String>, route: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            route: route.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.role, self.method, self.route)
    }
}

/// A single grant row as supplied by the data-access layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub role: String,
    pub route: String,
    pub method: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Grant {
    pub fn new(
        role: impl Into<String>,
        route: impl Into<String>,
        method: impl Into<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        Self {
            role: role.into(),
            route: route.into(),
            method: method.into(),
            from,
            to,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} [{}, {})", self.role, self.method, self.route, self.from, self.to)
    }
}

/// Outcome of a grant lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStatus {
    /// A grant exists and `now` is inside its window
    Active,
    /// No grant for the triple
    Missing,
    /// A grant exists but `now` is outside its window
    OutsideWindow,
}

/// Immutable grant map
#[derive(Debug, Clone, Default)]
pub struct GrantSnapshot {
    grants: HashMap<GrantKey, TimeRange>,
}

impl GrantSnapshot {
    /// Build a snapshot; a later row for the same triple wins
    pub fn build(grants: impl IntoIterator<Item = Grant>) -> Self {
        let mut map = HashMap::new();
        for grant in grants {
            let key = GrantKey::new(grant.role, grant.route, grant.method);
            if map.insert(key.clone(), TimeRange::new(grant.from, grant.to)).is_some() {
                warn!(grant = %key, "Duplicate grant in snapshot, keeping the last one");
            }
        }
        Self { grants: map }
    }

    pub fn check(&self, role: &str, route: &str, method: &str, now: DateTime<Utc>) -> GrantStatus {
        match self.grants.get(&GrantKey::new(role, route, method)) {
            None => GrantStatus::Missing,
            Some(range) if range.contains(now) => GrantStatus::Active,
            Some(_) => GrantStatus::OutsideWindow,
        }
    }

    pub fn window(&self, key: &GrantKey) -> Option<TimeRange> {
        self.grants.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// The active grant snapshot, swapped atomically on load
#[derive(Debug, Default)]
pub struct GrantTable {
    active: RwLock<Arc<GrantSnapshot>>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a new snapshot and make it the active one
    pub fn load(&self, grants: impl IntoIterator<Item = Grant>) -> Arc<GrantSnapshot> {
        let snapshot = Arc::new(GrantSnapshot::build(grants));
        *self.active.write() = snapshot.clone();
        info!(grants = snapshot.len(), "Loaded grant snapshot");
        snapshot
    }

    /// Fetch grants from `source` and swap them in
    ///
    /// On error the previous snapshot stays active.
    pub async fn reload_from(&self, source: &dyn GrantSource) -> Result<Arc<GrantSnapshot>, StorageError> {
        let grants = source.load_grants().await?;
        Ok(self.load(grants))
    }

    /// The snapshot in effect right now
    pub fn snapshot(&self) -> Arc<GrantSnapshot> {
        self.active.read().clone()
    }

    pub fn check(&self, role: &str, route: &str, method: &str, now: DateTime<Utc>) -> GrantStatus {
        self.snapshot().check(role, route, method, now)
    }

    /// Whether `role` may call `method route` at `now`
    pub fn valid(&self, role: &str, route: &str, method: &str, now: DateTime<Utc>) -> bool {
        self.check(role, route, method, now) == GrantStatus::Active
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
