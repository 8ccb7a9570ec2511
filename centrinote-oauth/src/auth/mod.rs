//! Request authentication and cookie handling

pub mod cookies;
pub mod session;

pub use cookies::{binding_cookie, clear_binding_cookie, read_cookie, BINDING_COOKIE};
pub use session::{OptionalSessionUser, SessionClaims, SessionUser, SessionVerifier, SESSION_COOKIE};
