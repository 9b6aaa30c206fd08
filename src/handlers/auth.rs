// Authentication handlers: sign-in and sign-out

use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{error, info};
use serde::Deserialize;

use crate::session::cookie::LoginState;
use crate::session::SessionManager;
use crate::settings::WasteworksSettings;
use crate::utils::crypto::generate_state_token;
use crate::utils::redirect::safe_redirect;

#[derive(Deserialize)]
pub struct SignInQuery {
    /// Page the user was on before login started
    pub redirect: Option<String>,
}

/// Start the login flow: seal the flow state into a short-lived cookie and
/// redirect to the provider's authorization endpoint
///
/// # Errors
///
/// Never returns an error; a failure to seal the state cookie falls back to
/// a redirect to the service root
pub async fn sign_in(
    query: web::Query<SignInQuery>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let state = generate_state_token();
    let login_state = LoginState {
        state: state.clone(),
        redirect: query.redirect.clone(),
    };

    let state_cookie = match session_manager
        .cookie_factory()
        .create_login_state_cookie(&login_state)
    {
        Ok(cookie) => cookie,
        Err(e) => {
            error!("Failed to seal login state cookie: {e}");
            return Ok(HttpResponse::Found()
                .append_header(("Location", "/"))
                .finish());
        }
    };

    let auth_url = session_manager.identity().authorization_url(&state);
    info!("Redirecting to identity provider for login");

    Ok(HttpResponse::Found()
        .cookie(state_cookie)
        .append_header(("Location", auth_url))
        .finish())
}

/// End the session: remove the store record, clear the cookie, and send the
/// user to the provider's end-session endpoint when it has one
///
/// # Errors
///
/// Returns an error on store backend failure
pub async fn sign_out(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
    settings: web::Data<WasteworksSettings>,
) -> Result<HttpResponse> {
    let clear_cookie = session_manager
        .cookie_factory()
        .create_expired_session_cookie();

    let Some((key, session)) = session_manager
        .load_session(&req)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
    else {
        // Nothing to sign out of, still clear the cookie
        return Ok(HttpResponse::Found()
            .cookie(clear_cookie)
            .append_header(("Location", "/"))
            .finish());
    };

    session_manager
        .remove_session(&key)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    info!("Signed out user {}", session.profile.id);

    let post_logout = settings.application.redirect_base_url.clone();
    let location = session_manager
        .identity()
        .end_session_url(&session.id_token, &post_logout)
        .unwrap_or_else(|| "/".to_string());

    Ok(HttpResponse::Found()
        .cookie(clear_cookie)
        .append_header(("Location", location))
        .finish())
}

/// Record the organisation the user linked after login
#[derive(Deserialize)]
pub struct LinkOrganisationBody {
    pub organisation_id: String,
}

/// Attach a linked organisation to the current session
///
/// # Errors
///
/// Returns an error on store backend failure
pub async fn link_organisation(
    req: HttpRequest,
    body: web::Json<LinkOrganisationBody>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let Some((key, _)) = session_manager
        .load_session(&req)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
    else {
        return Ok(HttpResponse::Unauthorized()
            .json(serde_json::json!({ "error": "not authenticated" })));
    };

    session_manager
        .set_linked_organisation(&key, &body.organisation_id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::NoContent().finish())
}

/// Validate a redirect target recorded before login
#[must_use]
pub fn post_login_redirect(login_redirect: Option<&str>) -> String {
    match login_redirect {
        Some(target) => safe_redirect(target),
        None => "/".to_string(),
    }
}
