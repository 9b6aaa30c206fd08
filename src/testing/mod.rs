//! Shared testing utilities
//!
//! Consolidates fixtures, request builders and the identity service double
//! used across unit and integration tests.
//!
//! - [`fixtures`] - pre-built sessions, profiles and wired-up managers
//! - [`requests`] - HTTP request builder for handler tests
//! - [`mock`] - identity service double with call counting

pub mod fixtures;
pub mod mock;
pub mod requests;

pub use fixtures::TestFixtures;
pub use mock::MockIdentityService;
pub use requests::RequestBuilder;

/// Common test constants
pub mod constants {
    /// Cookie sealing password used across tests, exactly 32 bytes
    pub const TEST_COOKIE_PASSWORD: &[u8] = b"test_cookie_password_32_chars_ok";

    /// Default test email address
    pub const TEST_EMAIL: &str = "jane@example.com";

    /// Subject id used by the mock identity provider
    pub const TEST_USER_ID: &str = "user-123";
}
