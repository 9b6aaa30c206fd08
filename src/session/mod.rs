//! Session subsystem: storage backends, cookie sealing, route guards and the
//! lifecycle manager that ties them together

pub mod cookie;
pub mod guard;
pub mod manager;
pub mod store;

pub use cookie::{CookieFactory, LoginState, COOKIE_NAME, LOGIN_STATE_COOKIE};
pub use guard::{decide, AccessDecision, AuthMode};
pub use manager::{SessionError, SessionManager, SessionStatus};
pub use store::{MemorySessionStore, RedisSessionStore, SessionStore, StoreError};
