//! Session lifecycle orchestration
//!
//! The `SessionManager` is the single entry point for session state: it
//! creates the server-side record on login, validates it on every request
//! (refreshing the token set when it nears expiry), and removes it on logout
//! or refresh rejection. Handlers never touch the store or the identity
//! service directly.

use std::sync::Arc;
use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{SessionKey, UserSession};
use crate::oidc::{AuthedUser, IdentityService, RefreshError, RefreshOutcome};
use crate::session::cookie::CookieFactory;
use crate::session::store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("failed to seal session cookie: {0}")]
    Cookie(String),
}

/// Per-request session verdict
#[derive(Debug)]
pub enum SessionStatus {
    /// An authenticated session exists; credentials are current
    Valid {
        key: SessionKey,
        session: UserSession,
    },
    /// No usable session; the request proceeds anonymous
    Invalid,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityService>,
    cookie_factory: CookieFactory,
    session_ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityService>,
        cookie_factory: CookieFactory,
        session_duration_hours: u64,
    ) -> Self {
        Self {
            store,
            identity,
            cookie_factory,
            session_ttl: Duration::from_secs(session_duration_hours * 3600),
        }
    }

    #[must_use]
    pub fn cookie_factory(&self) -> &CookieFactory {
        &self.cookie_factory
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityService> {
        &self.identity
    }

    /// Create a session record from verified identity material
    ///
    /// Generates a fresh session id, writes the store entry, and returns the
    /// sealed cookie to set on the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write or the cookie sealing fails
    pub async fn create_session(
        &self,
        authed: AuthedUser,
    ) -> Result<(SessionKey, Cookie<'static>), SessionError> {
        let key = SessionKey {
            session_id: Uuid::new_v4().to_string(),
        };
        let session = self.session_record(authed, None);

        self.store
            .set(&key.session_id, &session, self.session_ttl)
            .await?;

        let cookie = self
            .cookie_factory
            .create_session_cookie(&key)
            .map_err(|e| SessionError::Cookie(e.to_string()))?;

        log::info!("Created session for user {}", session.profile.id);
        Ok((key, cookie))
    }

    /// Load the session referenced by the request cookie, without any expiry
    /// or refresh handling
    ///
    /// # Errors
    ///
    /// Returns an error only on store backend failure; an absent or
    /// unreadable cookie is `Ok(None)`
    pub async fn load_session(
        &self,
        req: &HttpRequest,
    ) -> Result<Option<(SessionKey, UserSession)>, SessionError> {
        let Some(key) = self.cookie_factory.session_key_from_request(req) else {
            return Ok(None);
        };
        let Some(session) = self.store.get(&key.session_id).await? else {
            return Ok(None);
        };
        Ok(Some((key, session)))
    }

    /// Per-request validation: the heart of the session lifecycle
    ///
    /// A session whose token expires within one minute is refreshed before
    /// the request proceeds; a provider rejection removes the session and
    /// the request falls through to anonymous.
    ///
    /// Safe to call on every request, including anonymous ones.
    ///
    /// # Errors
    ///
    /// Returns an error on store backend failure, on a session that reaches
    /// the refresh engine without a refresh token, or on a transport-level
    /// refresh failure. A provider rejection is not an error.
    pub async fn validate_session(
        &self,
        req: &HttpRequest,
    ) -> Result<SessionStatus, SessionError> {
        let Some((key, session)) = self.load_session(req).await? else {
            return Ok(SessionStatus::Invalid);
        };

        if !session.is_expiring() {
            return Ok(SessionStatus::Valid { key, session });
        }

        log::debug!(
            "Token for user {} expires at {}, refreshing",
            session.profile.id,
            session.expires_at
        );

        match self.identity.refresh(&session).await? {
            RefreshOutcome::Refreshed(authed) => self.apply_refresh(key, &session, authed).await,
            RefreshOutcome::Rejected { status } => {
                log::warn!(
                    "Refresh rejected (status {status}) for user {}, removing session",
                    session.profile.id
                );
                self.remove_session(&key).await?;
                Ok(SessionStatus::Invalid)
            }
        }
    }

    /// Replace the session record with the refreshed token set
    ///
    /// The whole record is rewritten under the same session id; only the
    /// account link set after login survives from the old record. A session
    /// deleted while the refresh was in flight stays deleted.
    async fn apply_refresh(
        &self,
        key: SessionKey,
        previous: &UserSession,
        authed: AuthedUser,
    ) -> Result<SessionStatus, SessionError> {
        if self.store.get(&key.session_id).await?.is_none() {
            log::warn!(
                "Session {} removed during refresh for user {}, abandoning result",
                key.session_id,
                previous.profile.id
            );
            return Ok(SessionStatus::Invalid);
        }

        let session = self.session_record(authed, previous.linked_organisation_id.clone());
        self.store
            .set(&key.session_id, &session, self.session_ttl)
            .await?;

        log::debug!(
            "Refreshed session for user {}, new expiry {}",
            session.profile.id,
            session.expires_at
        );
        Ok(SessionStatus::Valid { key, session })
    }

    /// Remove the session record; removing an absent session succeeds
    ///
    /// # Errors
    ///
    /// Returns an error only on store backend failure
    pub async fn remove_session(&self, key: &SessionKey) -> Result<(), SessionError> {
        self.store.remove(&key.session_id).await?;
        Ok(())
    }

    /// Record the organisation the user linked after login
    ///
    /// Full-record replacement like every other mutation.
    ///
    /// # Errors
    ///
    /// Returns an error on store backend failure; linking against a missing
    /// session is a no-op
    pub async fn set_linked_organisation(
        &self,
        key: &SessionKey,
        organisation_id: &str,
    ) -> Result<(), SessionError> {
        let Some(mut session) = self.store.get(&key.session_id).await? else {
            log::warn!("Cannot link organisation: session {} not found", key.session_id);
            return Ok(());
        };

        session.linked_organisation_id = Some(organisation_id.to_string());
        self.store
            .set(&key.session_id, &session, self.session_ttl)
            .await?;
        Ok(())
    }

    fn session_record(
        &self,
        authed: AuthedUser,
        linked_organisation_id: Option<String>,
    ) -> UserSession {
        UserSession {
            profile: authed.profile,
            is_authenticated: true,
            token: authed.token,
            id_token: authed.id_token,
            refresh_token: authed.refresh_token,
            urls: self.identity.endpoint_urls(),
            expires_in_ms: authed.expires_in_ms,
            expires_at: authed.expires_at,
            linked_organisation_id,
        }
    }
}
