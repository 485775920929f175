//! Token verification and auth context resolution.

mod builder;
mod context;
mod token;

pub use builder::{AuthContextBuilder, UserStore};
pub use context::{AccessLevel, AuthContext};
pub use token::{JwtVerifier, LegacyIdentityVerifier, TokenClaims, TokenVerifier, VerifierChain};
