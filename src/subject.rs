//! Subject identity keys
//!
//! A subject is addressed by its tenant type plus its id within that tenant.
//! Both the revocation registry and the admission controller key their
//! state on this pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite `(tenant_type, subject_id)` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey {
    pub tenant_type: String,
    pub subject_id: String,
}

impl SubjectKey {
    pub fn new(tenant_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            tenant_type: tenant_type.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_type, self.subject_id)
    }
}
