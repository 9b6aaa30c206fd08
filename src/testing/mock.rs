//! Identity service double
//!
//! Counts calls so tests can assert exactly when refreshes happen, and can
//! be configured to reject refreshes or fail code exchange.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{EndpointUrls, UserSession};
use crate::oidc::{
    AuthedUser, IdentityError, IdentityService, RefreshError, RefreshOutcome,
};
use crate::testing::fixtures::TestFixtures;

type RefreshHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct MockIdentityService {
    refresh_calls: Arc<AtomicUsize>,
    exchange_calls: Arc<AtomicUsize>,
    reject_refresh_status: Option<u16>,
    fail_exchange: bool,
    on_refresh: Option<RefreshHook>,
}

impl Default for MockIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityService {
    /// A provider that accepts every exchange and refresh
    #[must_use]
    pub fn new() -> Self {
        Self {
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            exchange_calls: Arc::new(AtomicUsize::new(0)),
            reject_refresh_status: None,
            fail_exchange: false,
            on_refresh: None,
        }
    }

    /// A provider that rejects every refresh with the given status
    #[must_use]
    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_refresh_status: Some(status),
            ..Self::new()
        }
    }

    /// A provider whose code exchange always fails
    #[must_use]
    pub fn failing_exchange() -> Self {
        Self {
            fail_exchange: true,
            ..Self::new()
        }
    }

    /// Run the given async callback while each refresh call is in flight
    #[must_use]
    pub fn on_refresh<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.on_refresh = Some(Arc::new(hook));
        self
    }

    /// Counter incremented on every refresh attempt
    #[must_use]
    pub fn refresh_calls(&self) -> Arc<AtomicUsize> {
        self.refresh_calls.clone()
    }

    /// Counter incremented on every code exchange
    #[must_use]
    pub fn exchange_calls(&self) -> Arc<AtomicUsize> {
        self.exchange_calls.clone()
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "https://idp.test/authorize?client_id=test-client&response_type=code&state={state}&serviceId=service-1"
        )
    }

    fn end_session_url(&self, id_token: &str, post_logout_redirect: &str) -> Option<String> {
        Some(format!(
            "https://idp.test/logout?id_token_hint={}&post_logout_redirect_uri={}",
            urlencoding::encode(id_token),
            urlencoding::encode(post_logout_redirect),
        ))
    }

    fn endpoint_urls(&self) -> EndpointUrls {
        TestFixtures::endpoint_urls()
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthedUser, IdentityError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange || code == "bad-code" {
            return Err(IdentityError::Provider { status: 400 });
        }
        Ok(TestFixtures::authed_user())
    }

    async fn refresh(&self, session: &UserSession) -> Result<RefreshOutcome, RefreshError> {
        // Same precondition as the production service
        if session
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .is_none()
        {
            return Err(RefreshError::MissingRefreshToken);
        }

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(hook) = &self.on_refresh {
            hook().await;
        }

        if let Some(status) = self.reject_refresh_status {
            return Ok(RefreshOutcome::Rejected { status });
        }

        Ok(RefreshOutcome::Refreshed(TestFixtures::refreshed_user()))
    }
}
