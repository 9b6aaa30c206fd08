//! OIDC integration: claim mapping, id-token verification and the identity
//! provider adapter

pub mod claims;
pub mod jwt_validation;
pub mod service;

pub use jwt_validation::{JwtVerifier, JwtVerifyError};
pub use service::{
    AuthedUser, DiscoveryDocument, IdentityError, IdentityService, OidcIdentityService,
    RefreshError, RefreshOutcome,
};
