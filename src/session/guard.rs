//! Route access modes
//!
//! Business routes consume the session subsystem only through this narrow
//! surface: a validated-session lookup plus a redirect-to-login signal.

use crate::models::{SessionKey, UserSession};
use crate::session::manager::SessionStatus;

/// How a route treats authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Anonymous requests are redirected to login
    Required,
    /// The session is attached when present, anonymous otherwise
    Optional,
    /// No session handling at all
    Public,
}

/// Verdict for one request against one route's [`AuthMode`]
pub enum AccessDecision {
    /// Proceed, with the authenticated session when one exists
    Allow(Option<(SessionKey, UserSession)>),
    /// Send the user to login, remembering where they were headed
    RedirectToLogin { referrer: String },
}

/// Combine a route's auth mode with the per-request session verdict
#[must_use]
pub fn decide(mode: AuthMode, status: SessionStatus, requested_path: &str) -> AccessDecision {
    match (mode, status) {
        (AuthMode::Public, _) => AccessDecision::Allow(None),
        (_, SessionStatus::Valid { key, session }) => AccessDecision::Allow(Some((key, session))),
        (AuthMode::Optional, SessionStatus::Invalid) => AccessDecision::Allow(None),
        (AuthMode::Required, SessionStatus::Invalid) => AccessDecision::RedirectToLogin {
            referrer: requested_path.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;
    use chrono::Duration;

    fn valid_status() -> SessionStatus {
        SessionStatus::Valid {
            key: SessionKey {
                session_id: "sid".to_string(),
            },
            session: TestFixtures::session_expiring_in(Duration::hours(1)),
        }
    }

    #[test]
    fn test_required_with_valid_session_allows() {
        let decision = decide(AuthMode::Required, valid_status(), "/prns");
        match decision {
            AccessDecision::Allow(Some((key, _))) => assert_eq!(key.session_id, "sid"),
            _ => panic!("expected allow with session"),
        }
    }

    #[test]
    fn test_required_without_session_redirects_with_referrer() {
        let decision = decide(AuthMode::Required, SessionStatus::Invalid, "/prns?page=2");
        match decision {
            AccessDecision::RedirectToLogin { referrer } => assert_eq!(referrer, "/prns?page=2"),
            AccessDecision::Allow(_) => panic!("expected redirect"),
        }
    }

    #[test]
    fn test_optional_allows_either_way() {
        assert!(matches!(
            decide(AuthMode::Optional, valid_status(), "/"),
            AccessDecision::Allow(Some(_))
        ));
        assert!(matches!(
            decide(AuthMode::Optional, SessionStatus::Invalid, "/"),
            AccessDecision::Allow(None)
        ));
    }

    #[test]
    fn test_public_never_attaches_session() {
        assert!(matches!(
            decide(AuthMode::Public, valid_status(), "/health"),
            AccessDecision::Allow(None)
        ));
    }
}
