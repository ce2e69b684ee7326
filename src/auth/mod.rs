//! Authentication for registry-gate
//!
//! This module provides the token gatekeeper: signed-claims encoding, the
//! token issuer, and the authentication middleware.

pub mod claims;
pub mod issuer;
pub mod middleware;

pub use claims::{decode_token, encode_token, generate_token_id, Claims};
pub use issuer::{IssuedToken, TokenIssuer};
pub use middleware::{auth_middleware, AuthRejection, EXEMPT_PATHS, LEGACY_AUTH_HEADER};
