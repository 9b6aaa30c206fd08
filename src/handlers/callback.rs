// Provider callback handler: state check, code exchange, session creation

use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::handlers::auth::post_login_redirect;
use crate::session::SessionManager;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Complete the login flow after the provider redirects back
///
/// Any failure on this path sends the user back to the service root as
/// anonymous; the callback never renders an error page.
///
/// # Errors
///
/// Returns an error only on store backend failure while writing the new
/// session record
pub async fn callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let factory = session_manager.cookie_factory();
    let clear_state = factory.create_expired_login_state_cookie();

    let Some(login_state) = factory.login_state_from_request(&req) else {
        warn!("Callback without a readable login state cookie");
        return Ok(anonymous_redirect(clear_state));
    };

    if let Some(error) = &query.error {
        warn!(
            "Provider returned error on callback: {error} ({})",
            query.error_description.as_deref().unwrap_or("no description")
        );
        return Ok(anonymous_redirect(clear_state));
    }

    match &query.state {
        Some(state) if *state == login_state.state => {}
        _ => {
            warn!("Callback state mismatch, discarding login attempt");
            return Ok(anonymous_redirect(clear_state));
        }
    }

    let Some(code) = &query.code else {
        warn!("Callback without an authorization code");
        return Ok(anonymous_redirect(clear_state));
    };

    let authed = match session_manager.identity().exchange_code(code).await {
        Ok(authed) => authed,
        Err(e) => {
            warn!("Code exchange failed: {e}");
            return Ok(anonymous_redirect(clear_state));
        }
    };

    let (_, session_cookie) = session_manager
        .create_session(authed)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let target = post_login_redirect(login_state.redirect.as_deref());
    info!("Login complete, redirecting to {target}");

    Ok(HttpResponse::Found()
        .cookie(session_cookie)
        .cookie(clear_state)
        .append_header(("Location", target))
        .finish())
}

fn anonymous_redirect(clear_state: actix_web::cookie::Cookie<'static>) -> HttpResponse {
    HttpResponse::Found()
        .cookie(clear_state)
        .append_header(("Location", "/"))
        .finish()
}
