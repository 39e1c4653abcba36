//! `stockroom-auth` — identity boundary.
//!
//! Resolves "who is acting" for every request. Token transport (HTTP headers,
//! cookies) stays in the API crate; storage is never touched here.

pub mod claims;
pub mod identity;
pub mod jwt;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use identity::{Anonymous, AuthError, Identity, IdentityProvider, require_identity};
pub use jwt::{Hs256JwtValidator, JwtValidator};
