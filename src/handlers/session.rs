// Session introspection endpoint

use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Serialize;

use crate::models::UserProfile;
use crate::session::{SessionManager, SessionStatus};

#[derive(Serialize)]
struct SessionInfoResponse<'a> {
    authenticated: bool,
    profile: &'a UserProfile,
    expires_at: chrono::DateTime<chrono::Utc>,
    linked_organisation_id: Option<&'a str>,
}

/// Return the current session's profile, refreshing the token set first if
/// it is near expiry
///
/// # Errors
///
/// Returns an error on store backend failure or a hard refresh error
pub async fn session_info(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    match session_manager
        .validate_session(&req)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
    {
        SessionStatus::Valid { session, .. } => Ok(HttpResponse::Ok().json(SessionInfoResponse {
            authenticated: true,
            profile: &session.profile,
            expires_at: session.expires_at,
            linked_organisation_id: session.linked_organisation_id.as_deref(),
        })),
        SessionStatus::Invalid => Ok(HttpResponse::Unauthorized()
            .json(serde_json::json!({ "authenticated": false }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cookie::COOKIE_NAME;
    use crate::testing::{RequestBuilder, TestFixtures};

    #[tokio::test]
    async fn test_session_info_with_valid_session() {
        let (manager, _) = TestFixtures::session_manager();
        let (_, cookie) = manager
            .create_session(TestFixtures::authed_user())
            .await
            .unwrap();

        let req = RequestBuilder::new()
            .cookie(COOKIE_NAME, cookie.value())
            .build();
        let response = session_info(req, web::Data::new(manager)).await.unwrap();

        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_info_anonymous_is_unauthorized() {
        let (manager, _) = TestFixtures::session_manager();
        let req = RequestBuilder::new().build();

        let response = session_info(req, web::Data::new(manager)).await.unwrap();
        assert_eq!(response.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }
}
