//! Grant sources
//!
//! The grant table never reads a database itself. Whatever owns the grant
//! rows implements [`GrantSource`] and the table pulls a full snapshot from it
//! on reload.
//!
//! - JSON file: a flat list of `{role, route, method, from, to}` rows

mod json;

pub use json::JsonGrantFile;

use crate::auth::Grant;
pub use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Supplier of the full grant list
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Fetch every grant row
    async fn load_grants(&self) -> Result<Vec<Grant>, StorageError>;
}

/// Grants held in memory, for tests and embedding
#[async_trait]
impl GrantSource for Vec<Grant> {
    async fn load_grants(&self) -> Result<Vec<Grant>, StorageError> {
        Ok(self.clone())
    }
}
