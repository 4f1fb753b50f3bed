//! JWT authentication over two channels.
//!
//! An access token is read from the `Authorization` header or, failing that,
//! from the access cookie. Cookie-carried tokens are subject to a
//! double-submit CSRF check when it is enabled. Access tokens are stateless;
//! refresh tokens are revoked through the blacklist.

mod cookie;
mod csrf;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{append_set_cookies, clear_cookie, get_cookie, set_cookie};
pub use csrf::{check_csrf, generate_csrf_token};
pub use errors::{ApiAuthError, AuthErrorKind, TOKEN_NOT_VALID, WWW_AUTHENTICATE};
pub use extractors::Auth;
pub use ip::extract_client_ip;
pub use state::HasAuthBackend;
pub use types::{AuthenticatedUser, TokenSource};
