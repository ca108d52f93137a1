//! Revocation markers
//!
//! A marker says "every token for this subject issued before `revoked_at` is
//! void". Markers only move forward. Once a marker is older than the maximum
//! token lifetime, every token it could affect has expired on its own, so the
//! sweep drops it.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::auth::tokens::Payload;
use crate::config::ConfigError;
use crate::subject::SubjectKey;
use crate::sweep::Sweep;

/// Per-subject "revoke everything issued before" registry
#[derive(Debug)]
pub struct RevocationRegistry {
    markers: DashMap<SubjectKey, DateTime<Utc>>,
    max_token_lifetime: Duration,
}

impl RevocationRegistry {
    /// `max_token_lifetime` must be the issuing codec's cap; markers are kept
    /// for that long after they are set
    pub fn new(max_token_lifetime: Duration) -> Result<Self, ConfigError> {
        if max_token_lifetime <= Duration::zero() {
            return Err(ConfigError::InvalidTokenLifetime);
        }
        Ok(Self {
            markers: DashMap::new(),
            max_token_lifetime,
        })
    }

    pub fn max_token_lifetime(&self) -> Duration {
        self.max_token_lifetime
    }

    /// Invalidate every token for the subject issued before `now`
    ///
    /// Returns the marker in effect afterwards, which is never earlier than a
    /// marker already present.
    pub fn revoke_all(&self, tenant_type: &str, subject_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let key = SubjectKey::new(tenant_type, subject_id);
        let mut marker = self.markers.entry(key).or_insert(now);
        if *marker < now {
            *marker = now;
        }
        let effective = *marker;
        drop(marker);

        info!(tenant = tenant_type, subject = subject_id, revoked_at = %effective, "Revoked subject tokens");
        effective
    }

    /// Whether the token described by `payload` predates its subject's marker
    pub fn is_revoked(&self, payload: &Payload) -> bool {
        let key = SubjectKey::new(payload.tenant_type.as_str(), payload.subject_id.as_str());
        self.markers
            .get(&key)
            .is_some_and(|revoked_at| payload.issued_at < *revoked_at)
    }

    pub fn revoked_at(&self, key: &SubjectKey) -> Option<DateTime<Utc>> {
        self.markers.get(key).map(|r| *r)
    }

    /// Drop every marker
    pub fn reset(&self) {
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl Sweep for RevocationRegistry {
    fn name(&self) -> &'static str {
        "revocation"
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Some(horizon) = now.checked_sub_signed(self.max_token_lifetime) else {
            return 0;
        };

        let before = self.markers.len();
        self.markers.retain(|_, revoked_at| *revoked_at >= horizon);
        let removed = before.saturating_sub(self.markers.len());

        if removed > 0 {
            debug!(removed, remaining = self.markers.len(), "Dropped stale revocation markers");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(issued_at: DateTime<Utc>) -> Payload {
        Payload {
            subject_id: "42".to_string(),
            tenant_type: "users".to_string(),
            role: "editor".to_string(),
            rate_budget: 5.0,
            issued_at,
            expires_at: issued_at + Duration::hours(1),
        }
    }

    #[test]
    fn test_revocation_cutover() {
        let registry = RevocationRegistry::new(Duration::hours(1)).unwrap();
        let t = Utc::now();

        registry.revoke_all("users", "42", t);

        assert!(registry.is_revoked(&payload(t - Duration::nanoseconds(1))));
        assert!(!registry.is_revoked(&payload(t)));
        assert!(!registry.is_revoked(&payload(t + Duration::seconds(1))));
    }

    #[test]
    fn test_unrelated_subjects_unaffected() {
        let registry = RevocationRegistry::new(Duration::hours(1)).unwrap();
        let t = Utc::now();

        registry.revoke_all("devices", "42", t);
        assert!(!registry.is_revoked(&payload(t - Duration::minutes(1))));
    }

    #[test]
    fn test_marker_never_moves_backward() {
        let registry = RevocationRegistry::new(Duration::hours(1)).unwrap();
        let t = Utc::now();
        let key = SubjectKey::new("users", "42");

        registry.revoke_all("users", "42", t);
        let effective = registry.revoke_all("users", "42", t - Duration::minutes(10));
        assert_eq!(effective, t);
        assert_eq!(registry.revoked_at(&key), Some(t));

        let later = t + Duration::minutes(1);
        registry.revoke_all("users", "42", later);
        assert_eq!(registry.revoked_at(&key), Some(later));
    }

    #[test]
    fn test_sweep_drops_markers_older_than_lifetime() {
        let registry = RevocationRegistry::new(Duration::hours(1)).unwrap();
        let t = Utc::now();

        registry.revoke_all("users", "old", t - Duration::minutes(61));
        registry.revoke_all("users", "recent", t - Duration::minutes(59));

        assert_eq!(registry.sweep(t), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.revoked_at(&SubjectKey::new("users", "old")).is_none());
        assert!(registry.revoked_at(&SubjectKey::new("users", "recent")).is_some());
    }

    #[test]
    fn test_rejects_non_positive_lifetime() {
        for lifetime in [Duration::zero(), Duration::seconds(-60)] {
            assert!(matches!(
                RevocationRegistry::new(lifetime),
                Err(ConfigError::InvalidTokenLifetime)
            ));
        }
    }

    #[test]
    fn test_fresh_marker_survives_sweep() {
        let registry = RevocationRegistry::new(Duration::minutes(1)).unwrap();
        let t = Utc::now();

        registry.revoke_all("users", "42", t);
        assert_eq!(registry.sweep(t), 0);
        assert_eq!(registry.sweep(t + Duration::minutes(1)), 0);
        assert!(registry.is_revoked(&payload(t - Duration::seconds(1))));
    }

    #[test]
    fn test_reset() {
        let registry = RevocationRegistry::new(Duration::hours(1)).unwrap();
        registry.revoke_all("users", "1", Utc::now());
        registry.revoke_all("users", "2", Utc::now());

        registry.reset();
        assert!(registry.is_empty());
    }
}
