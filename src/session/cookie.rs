use actix_web::{cookie::Cookie, HttpRequest};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::SessionKey;
use crate::utils::crypto::{decrypt_data, encrypt_data};

/// Session cookie: carries only the sealed session lookup key
pub const COOKIE_NAME: &str = "userSession";
/// Short-lived cookie carrying login flow state across the provider redirect
pub const LOGIN_STATE_COOKIE: &str = "authState";

/// State sealed into the login cookie before redirecting to the provider
///
/// `state` is echoed back by the provider and must match; `redirect` is the
/// page the user was on before login started.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoginState {
    pub state: String,
    pub redirect: Option<String>,
}

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: actix_web::cookie::SameSite,
    pub path: String,
    pub max_age: actix_web::cookie::time::Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: actix_web::cookie::SameSite::Lax,
            path: "/".to_string(),
            max_age: actix_web::cookie::time::Duration::hours(3),
        }
    }
}

/// Cookie factory for sealing and unsealing the session cookies
///
/// All cookie payloads are AES-256-GCM sealed; a cookie that fails to unseal
/// for any reason is treated as absent, never as an error surfaced to the
/// user.
#[derive(Clone)]
pub struct CookieFactory {
    encryption_key: [u8; 32],
    cookie_secure: bool,
    session_duration_hours: u64,
}

impl CookieFactory {
    #[must_use]
    pub fn new(encryption_key: [u8; 32], cookie_secure: bool, session_duration_hours: u64) -> Self {
        Self {
            encryption_key,
            cookie_secure,
            session_duration_hours,
        }
    }

    /// Generic method to create a cookie with sealed data
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_cookie<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        options: CookieOptions,
    ) -> Result<Cookie<'static>> {
        let value = encrypt_data(data, &self.encryption_key)?;

        Ok(Cookie::build(name.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.cookie_secure && options.secure)
            .same_site(options.same_site)
            .path(options.path)
            .max_age(options.max_age)
            .finish())
    }

    /// Create the session cookie carrying a sealed [`SessionKey`]
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_session_cookie(&self, key: &SessionKey) -> Result<Cookie<'static>> {
        self.create_cookie(
            COOKIE_NAME,
            key,
            CookieOptions {
                max_age: actix_web::cookie::time::Duration::hours(
                    i64::try_from(self.session_duration_hours).unwrap_or(3),
                ),
                ..Default::default()
            },
        )
    }

    /// Create the short-lived login state cookie used across the provider
    /// redirect
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_login_state_cookie(&self, login_state: &LoginState) -> Result<Cookie<'static>> {
        self.create_cookie(
            LOGIN_STATE_COOKIE,
            login_state,
            CookieOptions {
                max_age: actix_web::cookie::time::Duration::minutes(10),
                ..Default::default()
            },
        )
    }

    /// Unseal the session key from the request cookie
    ///
    /// Returns `None` when the cookie is absent or fails to unseal; an
    /// unreadable cookie is logged and treated as not-authenticated.
    #[must_use]
    pub fn session_key_from_request(&self, req: &HttpRequest) -> Option<SessionKey> {
        let cookie = req.cookie(COOKIE_NAME)?;
        match decrypt_data::<SessionKey>(cookie.value(), &self.encryption_key) {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("Failed to unseal session cookie: {e}");
                None
            }
        }
    }

    /// Unseal the login state from the request cookie
    #[must_use]
    pub fn login_state_from_request(&self, req: &HttpRequest) -> Option<LoginState> {
        let cookie = req.cookie(LOGIN_STATE_COOKIE)?;
        match decrypt_data::<LoginState>(cookie.value(), &self.encryption_key) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Failed to unseal login state cookie: {e}");
                None
            }
        }
    }

    /// Create an expired cookie to clear the session
    #[must_use]
    pub fn create_expired_session_cookie(&self) -> Cookie<'static> {
        create_expired_cookie(COOKIE_NAME, self.cookie_secure)
    }

    /// Create an expired cookie to clear the login state
    #[must_use]
    pub fn create_expired_login_state_cookie(&self) -> Cookie<'static> {
        create_expired_cookie(LOGIN_STATE_COOKIE, self.cookie_secure)
    }
}

/// Create an expired cookie to clear a specific cookie
#[must_use]
pub fn create_expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_owned(), "")
        .http_only(true)
        .secure(secure)
        .same_site(actix_web::cookie::SameSite::Lax)
        .path("/")
        .max_age(actix_web::cookie::time::Duration::seconds(-1))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::requests::RequestBuilder;
    use crate::utils::crypto::derive_encryption_key;

    const TEST_PASSWORD: &[u8] = b"test_cookie_password_32_chars_ok";

    fn factory() -> CookieFactory {
        CookieFactory::new(derive_encryption_key(TEST_PASSWORD), false, 3)
    }

    #[test]
    fn test_session_cookie_round_trip() {
        let factory = factory();
        let key = SessionKey {
            session_id: "9f3c2a18-1111-2222-3333-444455556666".to_string(),
        };

        let cookie = factory.create_session_cookie(&key).unwrap();
        assert_eq!(cookie.name(), COOKIE_NAME);
        assert!(cookie.http_only().unwrap());
        assert_eq!(cookie.path().unwrap(), "/");
        // Opaque value, not the raw session id
        assert!(!cookie.value().contains("9f3c2a18"));

        let req = RequestBuilder::new()
            .cookie(COOKIE_NAME, cookie.value())
            .build();
        let unsealed = factory.session_key_from_request(&req).unwrap();
        assert_eq!(unsealed, key);
    }

    #[test]
    fn test_tampered_session_cookie_is_none() {
        let factory = factory();
        let key = SessionKey {
            session_id: "abc".to_string(),
        };

        let cookie = factory.create_session_cookie(&key).unwrap();
        let mut tampered = cookie.value().to_string();
        tampered.push('x');

        let req = RequestBuilder::new().cookie(COOKIE_NAME, &tampered).build();
        assert!(factory.session_key_from_request(&req).is_none());
    }

    #[test]
    fn test_missing_session_cookie_is_none() {
        let factory = factory();
        let req = RequestBuilder::new().build();
        assert!(factory.session_key_from_request(&req).is_none());
    }

    #[test]
    fn test_cookie_sealed_with_other_key_is_none() {
        let factory = factory();
        let other = CookieFactory::new(
            derive_encryption_key(b"completely_different_password_32"),
            false,
            3,
        );
        let key = SessionKey {
            session_id: "abc".to_string(),
        };

        let cookie = other.create_session_cookie(&key).unwrap();
        let req = RequestBuilder::new()
            .cookie(COOKIE_NAME, cookie.value())
            .build();
        assert!(factory.session_key_from_request(&req).is_none());
    }

    #[test]
    fn test_login_state_round_trip() {
        let factory = factory();
        let state = LoginState {
            state: "csrf-token".to_string(),
            redirect: Some("/organisations".to_string()),
        };

        let cookie = factory.create_login_state_cookie(&state).unwrap();
        assert_eq!(cookie.name(), LOGIN_STATE_COOKIE);
        assert_eq!(
            cookie.max_age().unwrap(),
            actix_web::cookie::time::Duration::minutes(10)
        );

        let req = RequestBuilder::new()
            .cookie(LOGIN_STATE_COOKIE, cookie.value())
            .build();
        assert_eq!(factory.login_state_from_request(&req).unwrap(), state);
    }

    #[test]
    fn test_create_expired_cookie() {
        let cookie = create_expired_cookie(COOKIE_NAME, true);
        assert_eq!(cookie.name(), COOKIE_NAME);
        assert_eq!(cookie.value(), "");
        assert!(cookie.secure().unwrap());
        assert!(cookie.max_age().unwrap().whole_seconds() < 0);
    }
}
