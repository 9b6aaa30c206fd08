// Protected business page, the consumer of the route guard

use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Serialize;

use crate::session::guard::{decide, AccessDecision, AuthMode};
use crate::session::SessionManager;

#[derive(Serialize)]
struct OrganisationsPage<'a> {
    display_name: &'a str,
    linked_organisation_id: Option<&'a str>,
    relationships: &'a [String],
}

/// The organisations overview, an authentication-required route
///
/// Anonymous requests are sent to sign-in carrying the requested path so the
/// user lands back here after login.
///
/// # Errors
///
/// Returns an error on store backend failure or a hard refresh error
pub async fn organisations(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let status = session_manager
        .validate_session(&req)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let requested = req
        .uri()
        .path_and_query()
        .map_or("/organisations", actix_web::http::uri::PathAndQuery::as_str);

    match decide(AuthMode::Required, status, requested) {
        AccessDecision::Allow(Some((_, session))) => {
            Ok(HttpResponse::Ok().json(OrganisationsPage {
                display_name: &session.profile.display_name,
                linked_organisation_id: session.linked_organisation_id.as_deref(),
                relationships: &session.profile.relationships,
            }))
        }
        AccessDecision::Allow(None) | AccessDecision::RedirectToLogin { .. } => {
            Ok(login_redirect(requested))
        }
    }
}

/// Redirect to sign-in, remembering where the user was headed
#[must_use]
pub fn login_redirect(referrer: &str) -> HttpResponse {
    HttpResponse::Found()
        .append_header((
            "Location",
            format!("/auth/sign-in?redirect={}", urlencoding::encode(referrer)),
        ))
        .finish()
}
