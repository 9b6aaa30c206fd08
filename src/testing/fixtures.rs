//! Pre-built test data

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::{EndpointUrls, UserProfile, UserSession};
use crate::oidc::AuthedUser;
use crate::session::cookie::CookieFactory;
use crate::session::manager::SessionManager;
use crate::session::store::MemorySessionStore;
use crate::testing::constants::{TEST_COOKIE_PASSWORD, TEST_EMAIL, TEST_USER_ID};
use crate::testing::mock::MockIdentityService;
use crate::utils::crypto::derive_encryption_key;

/// Central location for all test fixtures
pub struct TestFixtures;

impl TestFixtures {
    #[must_use]
    pub fn profile() -> UserProfile {
        UserProfile {
            id: TEST_USER_ID.to_string(),
            correlation_id: Some("corr-1".to_string()),
            contact_id: Some("contact-1".to_string()),
            service_id: Some("service-1".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: Some("Smith".to_string()),
            display_name: "Jane Smith".to_string(),
            email: Some(TEST_EMAIL.to_string()),
            unique_reference: Some("ref-1".to_string()),
            loa: Some("high".to_string()),
            aal: Some("aal2".to_string()),
            enrolment_count: Some(1),
            enrolment_request_count: Some(0),
            current_relationship_id: Some("rel-1".to_string()),
            relationships: vec!["rel-1:org-1".to_string()],
            roles: vec!["rel-1:admin".to_string()],
            jwt_exp: Some((Utc::now() + Duration::hours(1)).timestamp()),
        }
    }

    #[must_use]
    pub fn endpoint_urls() -> EndpointUrls {
        EndpointUrls {
            token: "https://idp.test/token".to_string(),
            logout: "https://idp.test/logout".to_string(),
        }
    }

    /// A stored session whose token expires after the given offset from now
    ///
    /// Negative offsets produce an already-expired token.
    #[must_use]
    pub fn session_expiring_in(offset: Duration) -> UserSession {
        UserSession {
            profile: Self::profile(),
            is_authenticated: true,
            token: "access-token".to_string(),
            id_token: "id-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            urls: Self::endpoint_urls(),
            expires_in_ms: 3_600_000,
            expires_at: Utc::now() + offset,
            linked_organisation_id: None,
        }
    }

    /// Identity material as produced by a successful code exchange
    #[must_use]
    pub fn authed_user() -> AuthedUser {
        AuthedUser {
            profile: Self::profile(),
            token: "access-token".to_string(),
            id_token: "id-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            expires_in_ms: 3_600_000,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    /// Identity material as produced by a successful refresh
    #[must_use]
    pub fn refreshed_user() -> AuthedUser {
        AuthedUser {
            profile: Self::profile(),
            token: "refreshed-access-token".to_string(),
            id_token: "refreshed-id-token".to_string(),
            refresh_token: Some("rotated-refresh-token".to_string()),
            expires_in_ms: 3_600_000,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[must_use]
    pub fn cookie_factory() -> CookieFactory {
        CookieFactory::new(derive_encryption_key(TEST_COOKIE_PASSWORD), false, 3)
    }

    /// A session manager wired to an in-process store and the default mock
    /// identity service
    #[must_use]
    pub fn session_manager() -> (SessionManager, Arc<MemorySessionStore>) {
        Self::session_manager_with(MockIdentityService::new())
    }

    #[must_use]
    pub fn session_manager_with(
        identity: MockIdentityService,
    ) -> (SessionManager, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(identity),
            Self::cookie_factory(),
            3,
        );
        (manager, store)
    }
}
