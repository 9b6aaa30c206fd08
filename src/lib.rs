#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the wasteworks application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod models;
pub mod oidc;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{
    callback, health, link_organisation, organisations, session_info, sign_in, sign_out,
};
pub use models::{SessionKey, UserProfile, UserSession};
pub use oidc::{IdentityService, OidcIdentityService};
pub use session::{SessionManager, SessionStatus};
pub use settings::WasteworksSettings;
