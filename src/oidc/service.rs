//! Identity provider adapter: discovery, code exchange and token refresh
//!
//! The discovery document is fetched exactly once at startup; a provider
//! that cannot be discovered is fatal. All later provider URLs (token,
//! logout) are captured into the session record so established sessions
//! never depend on re-reading discovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{EndpointUrls, TokenSet, UserProfile, UserSession};
use crate::oidc::claims::{calculate_expiry, map_profile};
use crate::oidc::jwt_validation::JwtVerifier;
use crate::settings::{ProviderSettings, WasteworksSettings};

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// OIDC discovery document, the subset of fields this service uses
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Verified identity material produced by code exchange or refresh
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub profile: UserProfile,
    /// Access token, falling back to the id token when the provider omits one
    pub token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_ms: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token endpoint request failed: {0}")]
    Transport(String),
    #[error("provider returned status {status}")]
    Provider { status: u16 },
    #[error("id token verification failed: {0}")]
    InvalidToken(String),
    #[error("claim mapping failed: {0}")]
    Claims(#[from] crate::oidc::claims::ClaimError),
}

/// Refresh failures that are programmer-visible errors, as opposed to the
/// recoverable provider rejection carried in [`RefreshOutcome::Rejected`]
#[derive(Debug, Error)]
pub enum RefreshError {
    /// A session without a refresh token must never reach the refresh engine
    #[error("cannot refresh: no refresh token")]
    MissingRefreshToken,
    #[error("token endpoint request failed: {0}")]
    Transport(String),
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Result of a refresh attempt against the provider
pub enum RefreshOutcome {
    /// Provider issued a new token set with re-verified identity claims
    Refreshed(AuthedUser),
    /// Provider rejected the refresh with a non-success status; the caller
    /// removes the session and the request proceeds anonymous
    Rejected { status: u16 },
}

/// The outward face of the identity provider
///
/// Handlers and the session manager only see this trait; the production
/// implementation talks OIDC, the test double does not.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Build the authorization redirect URL carrying the given state token
    fn authorization_url(&self, state: &str) -> String;

    /// Build the provider logout URL, or `None` when the provider has no
    /// end-session endpoint
    fn end_session_url(&self, id_token: &str, post_logout_redirect: &str) -> Option<String>;

    /// Provider endpoint URLs to capture into new session records
    fn endpoint_urls(&self) -> EndpointUrls;

    /// Exchange an authorization code for verified identity material
    async fn exchange_code(&self, code: &str) -> Result<AuthedUser, IdentityError>;

    /// Attempt to refresh the session's token set
    async fn refresh(&self, session: &UserSession) -> Result<RefreshOutcome, RefreshError>;
}

/// Production identity service backed by a discovered OIDC provider
pub struct OidcIdentityService {
    discovery: DiscoveryDocument,
    verifier: JwtVerifier,
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    service_id: String,
    redirect_uri: String,
    scope: String,
}

impl OidcIdentityService {
    /// Fetch the discovery document and JWKS, then build the service
    ///
    /// Called once at startup; any failure here is fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery document or JWKS cannot be fetched
    /// or parsed
    pub async fn discover(settings: &WasteworksSettings) -> anyhow::Result<Self> {
        let provider = &settings.provider;
        let client = HTTP_CLIENT.clone();

        log::info!(
            "Fetching OIDC discovery document from {}",
            provider.discovery_url
        );
        let discovery: DiscoveryDocument = client
            .get(&provider.discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        log::info!("Discovered issuer {}", discovery.issuer);

        let verifier = JwtVerifier::new(&discovery.jwks_uri, client.clone()).await?;

        Ok(Self::from_parts(discovery, verifier, client, provider, settings))
    }

    fn from_parts(
        discovery: DiscoveryDocument,
        verifier: JwtVerifier,
        client: reqwest::Client,
        provider: &ProviderSettings,
        settings: &WasteworksSettings,
    ) -> Self {
        Self {
            discovery,
            verifier,
            client,
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            service_id: provider.service_id.clone(),
            redirect_uri: format!(
                "{}/auth/callback",
                settings.application.redirect_base_url.trim_end_matches('/')
            ),
            scope: settings.token_scope(),
        }
    }

    /// Turn a verified token set into an [`AuthedUser`]
    async fn authed_user_from_token_set(
        &self,
        token_set: TokenSet,
    ) -> Result<AuthedUser, IdentityError> {
        let claims = self
            .verifier
            .verify(&token_set.id_token)
            .await
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        let profile = map_profile(&claims)?;

        let (expires_in_ms, expires_at) = calculate_expiry(token_set.expires_in, profile.jwt_exp);
        let token = token_set
            .access_token
            .unwrap_or_else(|| token_set.id_token.clone());

        Ok(AuthedUser {
            profile,
            token,
            id_token: token_set.id_token,
            refresh_token: token_set.refresh_token,
            expires_in_ms,
            expires_at,
        })
    }
}

#[async_trait]
impl IdentityService for OidcIdentityService {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}&serviceId={}",
            self.discovery.authorization_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scope),
            urlencoding::encode(state),
            urlencoding::encode(&self.service_id),
        )
    }

    fn end_session_url(&self, id_token: &str, post_logout_redirect: &str) -> Option<String> {
        self.discovery.end_session_endpoint.as_ref().map(|endpoint| {
            format!(
                "{endpoint}?id_token_hint={}&post_logout_redirect_uri={}",
                urlencoding::encode(id_token),
                urlencoding::encode(post_logout_redirect),
            )
        })
    }

    fn endpoint_urls(&self) -> EndpointUrls {
        EndpointUrls {
            token: self.discovery.token_endpoint.clone(),
            logout: self
                .discovery
                .end_session_endpoint
                .clone()
                .unwrap_or_default(),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthedUser, IdentityError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
            ("scope", &self.scope),
        ];

        let response = self
            .client
            .post(&self.discovery.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Code exchange rejected with status {status}");
            return Err(IdentityError::Provider {
                status: status.as_u16(),
            });
        }

        let token_set: TokenSet = response
            .json()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        self.authed_user_from_token_set(token_set).await
    }

    async fn refresh(&self, session: &UserSession) -> Result<RefreshOutcome, RefreshError> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::MissingRefreshToken)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", refresh_token),
            ("scope", &self.scope),
        ];

        // The token URL captured at login, not the discovery document
        let response = self
            .client
            .post(&session.urls.token)
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::info!(
                "Provider rejected token refresh for user {} with status {status}",
                session.profile.id
            );
            return Ok(RefreshOutcome::Rejected {
                status: status.as_u16(),
            });
        }

        let token_set: TokenSet = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        let authed = self
            .authed_user_from_token_set(token_set)
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        Ok(RefreshOutcome::Refreshed(authed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_document_parsing() {
        let json = r#"{
            "issuer": "https://idp.example",
            "authorization_endpoint": "https://idp.example/authorize",
            "token_endpoint": "https://idp.example/token",
            "jwks_uri": "https://idp.example/jwks",
            "end_session_endpoint": "https://idp.example/logout",
            "scopes_supported": ["openid", "profile"]
        }"#;

        let doc: DiscoveryDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.issuer, "https://idp.example");
        assert_eq!(
            doc.end_session_endpoint.as_deref(),
            Some("https://idp.example/logout")
        );
    }

    #[test]
    fn test_discovery_document_without_end_session() {
        let json = r#"{
            "issuer": "https://idp.example",
            "authorization_endpoint": "https://idp.example/authorize",
            "token_endpoint": "https://idp.example/token",
            "jwks_uri": "https://idp.example/jwks"
        }"#;

        let doc: DiscoveryDocument = serde_json::from_str(json).unwrap();
        assert!(doc.end_session_endpoint.is_none());
    }

    #[test]
    fn test_missing_refresh_token_message() {
        assert_eq!(
            RefreshError::MissingRefreshToken.to_string(),
            "cannot refresh: no refresh token"
        );
    }
}
