use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity data extracted from a verified id-token payload
///
/// Field names follow the identity provider's claim set one-to-one; the
/// mapping itself lives in `oidc::claims` as a pure function.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserProfile {
    /// Subject claim, the provider's stable user id
    pub id: String,
    pub correlation_id: Option<String>,
    pub contact_id: Option<String>,
    pub service_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Space-joined non-empty first/last name
    pub display_name: String,
    pub email: Option<String>,
    pub unique_reference: Option<String>,
    /// Level of assurance
    pub loa: Option<String>,
    /// Authentication assurance level
    pub aal: Option<String>,
    pub enrolment_count: Option<i64>,
    pub enrolment_request_count: Option<i64>,
    pub current_relationship_id: Option<String>,
    #[serde(default)]
    pub relationships: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Raw token `exp` claim, kept as a fallback for expiry derivation
    pub jwt_exp: Option<i64>,
}

/// Provider endpoint URLs captured at login so refresh and logout never
/// depend on re-reading the discovery document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EndpointUrls {
    pub token: String,
    pub logout: String,
}

/// Complete user session stored server-side, keyed by an opaque session id
///
/// This record is the single source of authorization truth; the cookie only
/// carries the lookup key. Refresh replaces the whole record, never
/// individual fields.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserSession {
    pub profile: UserProfile,
    pub is_authenticated: bool,
    /// Access token
    pub token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub urls: EndpointUrls,
    /// Token lifetime at issue, in milliseconds
    pub expires_in_ms: i64,
    pub expires_at: DateTime<Utc>,
    /// Set by the account-linking screen after login
    pub linked_organisation_id: Option<String>,
}

/// Refresh window before token expiry
pub const REFRESH_BUFFER_SECONDS: i64 = 60;

impl UserSession {
    /// Check whether the access token expires within the refresh window
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(REFRESH_BUFFER_SECONDS)
    }
}

/// Payload sealed into the `userSession` cookie: a lookup key, nothing else
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionKey {
    pub session_id: String,
}

/// Token response from the provider's token endpoint
#[derive(Deserialize, Clone, Debug)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
