//! Authentication user types.

use crate::db::User;
use crate::jwt::AccessClaims;

/// Where the access token of an authenticated request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: <type> <token>` header
    Header,
    /// Access cookie (CSRF-checked when enabled)
    Cookie,
}

/// Authenticated user attached to a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Active user loaded from the token subject
    pub user: User,
    /// JWT claims from the access token
    pub claims: AccessClaims,
    pub source: TokenSource,
}
