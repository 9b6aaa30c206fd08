//! HTTP handlers for the authentication surface

pub mod auth;
pub mod callback;
pub mod health;
pub mod pages;
pub mod session;

pub use auth::{link_organisation, sign_in, sign_out};
pub use callback::callback;
pub use health::health;
pub use pages::organisations;
pub use session::session_info;
