//! Domain primitives shared across the core: normalized scopes, redacted secrets, and
//! trusted claim payloads decoded from token responses.

pub mod client_info;
pub mod scope;

mod secret;

pub use client_info::{ClientInfo, IdTokenClaims};
pub use scope::{ScopeSet, ScopeValidationError};
pub use secret::TokenSecret;
