//! Authentication settings, built once at startup and shared by every component.

use std::time::Duration;

/// Default access token lifetime: 5 minutes.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Default refresh token lifetime: 1 day.
pub const DEFAULT_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Value of the `SameSite` cookie attribute.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes of one token cookie. A cookie without a name is disabled.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl CookieSettings {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            domain: None,
            path: "/".to_string(),
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }

    pub fn disabled() -> Self {
        Self {
            name: None,
            ..Self::new("")
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Double-submit CSRF settings for cookie-carried tokens.
#[derive(Debug, Clone)]
pub struct CsrfSettings {
    /// Check CSRF when the access token came from a cookie.
    pub enabled: bool,
    /// Check CSRF on every cookie-mode request, even without a token cookie.
    pub enforce_on_unauthenticated: bool,
    pub cookie_name: String,
    pub header_name: String,
    /// Allowed `Origin` values for unsafe requests. Empty disables the origin check.
    pub trusted_origins: Vec<String>,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            enforce_on_unauthenticated: false,
            cookie_name: "csrftoken".to_string(),
            header_name: "x-csrftoken".to_string(),
            trusted_origins: Vec::new(),
        }
    }
}

/// Whether accounts must confirm their e-mail address before receiving tokens.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailVerification {
    #[default]
    None,
    Optional,
    Mandatory,
}

impl EmailVerification {
    pub fn is_mandatory(&self) -> bool {
        matches!(self, EmailVerification::Mandatory)
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// Issue a new refresh token on every refresh.
    pub rotate_refresh_tokens: bool,
    /// Blacklist the old refresh token after rotation.
    pub blacklist_after_rotation: bool,
    /// Persist revoked refresh tokens and reject them afterwards.
    pub blacklist_enabled: bool,
    /// Include `access_expiration` / `refresh_expiration` in login responses.
    pub return_expiration: bool,
    /// Accepted `Authorization` header schemes.
    pub auth_header_types: Vec<String>,
    pub access_cookie: CookieSettings,
    pub refresh_cookie: CookieSettings,
    pub csrf: CsrfSettings,
    pub email_verification: EmailVerification,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_lifetime: DEFAULT_ACCESS_TOKEN_LIFETIME,
            refresh_token_lifetime: DEFAULT_REFRESH_TOKEN_LIFETIME,
            rotate_refresh_tokens: false,
            blacklist_after_rotation: false,
            blacklist_enabled: true,
            return_expiration: false,
            auth_header_types: vec!["Bearer".to_string()],
            access_cookie: CookieSettings::new("access_token"),
            refresh_cookie: CookieSettings::new("refresh_token"),
            csrf: CsrfSettings::default(),
            email_verification: EmailVerification::None,
        }
    }
}

impl AuthSettings {
    /// Refresh tokens live only in an httponly cookie and are kept out of response bodies.
    pub fn refresh_cookie_only(&self) -> bool {
        self.refresh_cookie.name.is_some() && self.refresh_cookie.http_only
    }

    /// Apply the same `Secure` flag to both token cookies.
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.access_cookie.secure = secure;
        self.refresh_cookie.secure = secure;
        self
    }
}
