//! Claim extraction from verified id-token payloads
//!
//! Everything here is a pure function over an already-verified claims object;
//! signature verification happens in `jwt_validation` before any of this
//! runs.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::UserProfile;

/// Token lifetime assumed when the provider sends neither `expires_in` nor a
/// usable `exp` claim
pub const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
}

/// Map a verified id-token claims object to a [`UserProfile`]
///
/// Only `sub` is required; every other claim is optional and maps to `None`
/// when absent.
///
/// # Errors
///
/// Returns an error if the `sub` claim is missing or not a string
pub fn map_profile(claims: &Value) -> Result<UserProfile, ClaimError> {
    let id = string_claim(claims, "sub").ok_or(ClaimError::MissingClaim("sub"))?;

    let first_name = string_claim(claims, "firstName");
    let last_name = string_claim(claims, "lastName");
    let display_name = display_name(first_name.as_deref(), last_name.as_deref());

    Ok(UserProfile {
        id,
        correlation_id: string_claim(claims, "correlationId"),
        contact_id: string_claim(claims, "contactId"),
        service_id: string_claim(claims, "serviceId"),
        first_name,
        last_name,
        display_name,
        email: string_claim(claims, "email"),
        unique_reference: string_claim(claims, "uniqueReference"),
        loa: string_claim(claims, "loa"),
        aal: string_claim(claims, "aal"),
        enrolment_count: claims.get("enrolmentCount").and_then(Value::as_i64),
        enrolment_request_count: claims.get("enrolmentRequestCount").and_then(Value::as_i64),
        current_relationship_id: string_claim(claims, "currentRelationshipId"),
        relationships: string_array_claim(claims, "relationships"),
        roles: string_array_claim(claims, "roles"),
        jwt_exp: claims.get("exp").and_then(Value::as_i64),
    })
}

/// Space-join the non-empty parts of a user's name
#[must_use]
pub fn display_name(first_name: Option<&str>, last_name: Option<&str>) -> String {
    [first_name, last_name]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive token expiry from the token response and id-token claims
///
/// Preference order: a positive `expires_in` from the token response
/// (seconds), then the id-token's `exp` claim, then a one hour default.
/// Returns the lifetime in milliseconds together with the absolute expiry
/// instant.
#[must_use]
pub fn calculate_expiry(
    expires_in_seconds: Option<i64>,
    jwt_exp: Option<i64>,
) -> (i64, DateTime<Utc>) {
    let now = Utc::now();

    if let Some(seconds) = expires_in_seconds.filter(|s| *s > 0) {
        return (seconds * 1000, now + Duration::seconds(seconds));
    }

    if let Some(exp) = jwt_exp {
        if let Some(expires_at) = DateTime::from_timestamp(exp, 0) {
            let remaining_ms = (expires_at - now).num_milliseconds();
            if remaining_ms > 0 {
                return (remaining_ms, expires_at);
            }
        }
    }

    (
        DEFAULT_EXPIRES_IN_SECONDS * 1000,
        now + Duration::seconds(DEFAULT_EXPIRES_IN_SECONDS),
    )
}

fn string_claim(claims: &Value, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn string_array_claim(claims: &Value, name: &str) -> Vec<String> {
    match claims.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        // Some providers send a single colon-delimited string instead of an array
        Some(Value::String(item)) => vec![item.clone()],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name_joins_non_empty_parts() {
        assert_eq!(display_name(Some("John"), Some("Doe")), "John Doe");
        assert_eq!(display_name(Some("John"), None), "John");
        assert_eq!(display_name(None, Some("Doe")), "Doe");
        assert_eq!(display_name(Some("John"), Some("")), "John");
        assert_eq!(display_name(Some(""), Some("")), "");
        assert_eq!(display_name(None, None), "");
    }

    #[test]
    fn test_map_profile_full_claims() {
        let claims = json!({
            "sub": "user-123",
            "correlationId": "corr-1",
            "contactId": "contact-1",
            "serviceId": "service-1",
            "firstName": "Jane",
            "lastName": "Smith",
            "email": "jane@example.com",
            "uniqueReference": "ref-1",
            "loa": "high",
            "aal": "aal2",
            "enrolmentCount": 2,
            "enrolmentRequestCount": 1,
            "currentRelationshipId": "rel-1",
            "relationships": ["rel-1:org-1", "rel-2:org-2"],
            "roles": ["rel-1:admin"],
            "exp": 1_704_110_400
        });

        let profile = map_profile(&claims).unwrap();
        assert_eq!(profile.id, "user-123");
        assert_eq!(profile.display_name, "Jane Smith");
        assert_eq!(profile.enrolment_count, Some(2));
        assert_eq!(profile.relationships.len(), 2);
        assert_eq!(profile.roles, vec!["rel-1:admin"]);
        assert_eq!(profile.jwt_exp, Some(1_704_110_400));
    }

    #[test]
    fn test_map_profile_minimal_claims() {
        let claims = json!({ "sub": "user-123" });

        let profile = map_profile(&claims).unwrap();
        assert_eq!(profile.id, "user-123");
        assert_eq!(profile.display_name, "");
        assert!(profile.email.is_none());
        assert!(profile.relationships.is_empty());
        assert!(profile.jwt_exp.is_none());
    }

    #[test]
    fn test_map_profile_missing_sub_fails() {
        let claims = json!({ "email": "jane@example.com" });
        assert!(matches!(
            map_profile(&claims),
            Err(ClaimError::MissingClaim("sub"))
        ));
    }

    #[test]
    fn test_map_profile_single_string_relationship() {
        let claims = json!({
            "sub": "user-123",
            "relationships": "rel-1:org-1"
        });

        let profile = map_profile(&claims).unwrap();
        assert_eq!(profile.relationships, vec!["rel-1:org-1"]);
    }

    #[test]
    fn test_calculate_expiry_prefers_expires_in() {
        let far_exp = Utc::now().timestamp() + 7200;
        let (ms, at) = calculate_expiry(Some(600), Some(far_exp));

        assert_eq!(ms, 600_000);
        let delta = (at - Utc::now()).num_seconds();
        assert!((595..=600).contains(&delta));
    }

    #[test]
    fn test_calculate_expiry_falls_back_to_jwt_exp() {
        let exp = Utc::now().timestamp() + 1800;
        let (ms, at) = calculate_expiry(None, Some(exp));

        assert_eq!(at.timestamp(), exp);
        assert!(ms > 1_790_000 && ms <= 1_800_000);
    }

    #[test]
    fn test_calculate_expiry_ignores_non_positive_expires_in() {
        // A zero lifetime from the provider is not authoritative; the exp
        // claim wins
        let exp = Utc::now().timestamp() + 900;
        let (ms, at) = calculate_expiry(Some(0), Some(exp));
        assert_eq!(at.timestamp(), exp);
        assert!(ms > 890_000 && ms <= 900_000);

        let (ms, at) = calculate_expiry(Some(-5), Some(exp));
        assert_eq!(at.timestamp(), exp);
        assert!(ms > 0);

        // Nothing else usable falls through to the default
        let (ms, _) = calculate_expiry(Some(0), None);
        assert_eq!(ms, 3_600_000);
    }

    #[test]
    fn test_calculate_expiry_default_when_nothing_usable() {
        let (ms, at) = calculate_expiry(None, None);
        assert_eq!(ms, 3_600_000);
        assert!((at - Utc::now()).num_seconds() >= 3599);

        // An already-past exp claim falls through to the default too
        let (ms, _) = calculate_expiry(None, Some(Utc::now().timestamp() - 100));
        assert_eq!(ms, 3_600_000);
    }
}
