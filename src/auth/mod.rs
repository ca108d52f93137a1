//! Authentication and authorization
//!
//! - `tokens`: stateless identity tokens signed with HMAC-SHA256
//! - `revocation`: per-subject "revoke everything issued before" markers
//! - `grants`: `(role, route, method)` entitlements with a validity window

mod grants;
mod revocation;
mod tokens;

pub use grants::{Grant, GrantKey, GrantSnapshot, GrantStatus, GrantTable, TimeRange};
pub use revocation::RevocationRegistry;
pub use tokens::{
    sign, verify, AdminKey, Header, Identity, Payload, Token, TokenCodec, TokenError, TokenSecret,
    TOKEN_ALGORITHM, TOKEN_TYPE,
};
