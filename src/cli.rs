//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::db::{Database, NewUser};
use crate::jwt::ClaimsKind;
use crate::password::{hash_password, validate_password};
use crate::settings::{
    AuthSettings, CookieSettings, CsrfSettings, EmailVerification, SameSite,
};
use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Mentoreed",
    about = "Account service with JWT cookie and header authentication"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "MENTOREED_PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "MENTOREED_DATABASE", default_value = "mentoreed.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Public origin of the service. Cookies are marked Secure when it uses HTTPS
    #[arg(long, env = "MENTOREED_PUBLIC_ORIGIN", default_value = "http://localhost:8000")]
    pub public_origin: String,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "300", value_parser = parse_lifetime)]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value = "86400", value_parser = parse_lifetime)]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token on every refresh
    #[arg(long)]
    pub rotate_refresh_tokens: bool,

    /// Blacklist the previous refresh token after rotation
    #[arg(long, requires = "rotate_refresh_tokens")]
    pub blacklist_after_rotation: bool,

    /// Do not persist revoked refresh tokens
    #[arg(long, conflicts_with = "blacklist_after_rotation")]
    pub no_blacklist: bool,

    /// Include token expiration timestamps in login responses
    #[arg(long)]
    pub return_expiration: bool,

    /// Accepted Authorization header types, comma separated
    #[arg(long, value_delimiter = ',', default_value = "Bearer")]
    pub auth_header_types: Vec<String>,

    /// Name of the access token cookie
    #[arg(long, default_value = "access_token")]
    pub access_cookie: String,

    /// Do not set or read an access token cookie
    #[arg(long)]
    pub no_access_cookie: bool,

    /// Name of the refresh token cookie
    #[arg(long, default_value = "refresh_token")]
    pub refresh_cookie: String,

    /// Do not set or read a refresh token cookie
    #[arg(long)]
    pub no_refresh_cookie: bool,

    /// Path of the refresh token cookie
    #[arg(long, default_value = "/")]
    pub refresh_cookie_path: String,

    /// Domain attribute of both token cookies
    #[arg(long)]
    pub cookie_domain: Option<String>,

    /// SameSite attribute of both token cookies
    #[arg(long, default_value = "lax")]
    pub cookie_samesite: SameSite,

    /// Make the token cookies readable by scripts and return the refresh token in bodies
    #[arg(long)]
    pub no_cookie_httponly: bool,

    /// Require a double-submit CSRF token for cookie-authenticated unsafe requests
    #[arg(long)]
    pub csrf: bool,

    /// Also check CSRF on requests without an access cookie
    #[arg(long, requires = "csrf")]
    pub csrf_on_unauthenticated: bool,

    /// Trusted Origin values for unsafe requests, comma separated
    #[arg(long, value_delimiter = ',', requires = "csrf")]
    pub csrf_trusted_origins: Vec<String>,

    /// Whether an unverified e-mail address blocks login
    #[arg(long, default_value = "none")]
    pub email_verification: EmailVerification,

    /// Custom claims embedded in issued tokens
    #[arg(long, default_value = "basic")]
    pub token_claims: ClaimsKind,

    /// Auth requests (register, login, logout) allowed per IP and minute. 0 disables
    #[arg(long, env = "MENTOREED_AUTH_RATE_LIMIT", default_value = "20")]
    pub auth_rate_limit: u32,

    /// Read the client IP from this header (e.g. x-forwarded-for) instead of the socket
    #[arg(long, value_parser = parse_header_name)]
    pub ip_header: Option<HeaderName>,

    /// Disable new user signups (staff creation via --create-staff-user still works)
    #[arg(long)]
    pub no_signup: bool,

    /// Delete blacklist entries of expired tokens and exit
    #[arg(long)]
    pub flush_expired_tokens: bool,

    /// Create an active staff user with this username (password from STAFF_PASSWORD)
    #[arg(long, requires = "staff_email")]
    pub create_staff_user: Option<String>,

    /// E-mail address of the staff user created with --create-staff-user
    #[arg(long)]
    pub staff_email: Option<String>,

    /// Deactivate the user with this username and exit
    #[arg(long)]
    pub deactivate_user: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Longest accepted token lifetime (ten years).
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn parse_lifetime(s: &str) -> Result<Duration, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("Lifetime must be a number of seconds: {}", s))?;
    if secs == 0 {
        return Err("Lifetime must be at least one second".to_string());
    }
    if secs > MAX_LIFETIME_SECS {
        return Err(format!(
            "Lifetime must be at most {} seconds",
            MAX_LIFETIME_SECS
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_header_name(s: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(s.to_ascii_lowercase().as_bytes())
        .map_err(|_| format!("Invalid header name: {}", s))
}

impl Args {
    /// Fold the cookie, token and CSRF flags into `AuthSettings`.
    pub fn auth_settings(&self, secure_cookies: bool) -> AuthSettings {
        let http_only = !self.no_cookie_httponly;

        let access_cookie = if self.no_access_cookie {
            CookieSettings::disabled()
        } else {
            CookieSettings {
                domain: self.cookie_domain.clone(),
                http_only,
                same_site: self.cookie_samesite,
                ..CookieSettings::new(&self.access_cookie)
            }
        };

        let refresh_cookie = if self.no_refresh_cookie {
            CookieSettings::disabled()
        } else {
            CookieSettings {
                domain: self.cookie_domain.clone(),
                path: self.refresh_cookie_path.clone(),
                http_only,
                same_site: self.cookie_samesite,
                ..CookieSettings::new(&self.refresh_cookie)
            }
        };

        AuthSettings {
            access_token_lifetime: self.access_token_lifetime,
            refresh_token_lifetime: self.refresh_token_lifetime,
            rotate_refresh_tokens: self.rotate_refresh_tokens,
            blacklist_after_rotation: self.blacklist_after_rotation,
            blacklist_enabled: !self.no_blacklist,
            return_expiration: self.return_expiration,
            auth_header_types: self.auth_header_types.clone(),
            access_cookie,
            refresh_cookie,
            csrf: CsrfSettings {
                enabled: self.csrf,
                enforce_on_unauthenticated: self.csrf_on_unauthenticated,
                trusted_origins: self.csrf_trusted_origins.clone(),
                ..CsrfSettings::default()
            },
            email_verification: self.email_verification,
        }
        .with_secure_cookies(secure_cookies)
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public origin URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match Url::parse(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(origin = %public_origin, "public-origin must be an http or https URL");
        return None;
    }

    let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
    if url.scheme() != "https" && !is_local {
        warn!("public-origin is not HTTPS; cookies will be sent without the Secure flag");
    }

    Some(url)
}

/// Handle the --create-staff-user flag: create an active staff account.
/// The password is read from the STAFF_PASSWORD environment variable.
pub async fn handle_create_staff(db: &Database, username: &str, email: &str) {
    let Ok(password) = std::env::var("STAFF_PASSWORD") else {
        error!("STAFF_PASSWORD environment variable is required with --create-staff-user");
        std::process::exit(1);
    };
    // SAFETY: Still single-threaded startup, see load_jwt_secret.
    unsafe { std::env::remove_var("STAFF_PASSWORD") };

    let problems = validate_password(&password, Some(username));
    if !problems.is_empty() {
        for problem in problems {
            error!("{}", problem);
        }
        std::process::exit(1);
    }

    match db.users().is_username_taken(username, None).await {
        Ok(true) => {
            println!();
            println!("User already exists: {}", username);
            println!();
            return;
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash password");
            std::process::exit(1);
        }
    };

    let uuid = Uuid::new_v4().to_string();
    let created = db
        .users()
        .create(NewUser {
            uuid: &uuid,
            username,
            email,
            password_hash: &password_hash,
            is_staff: true,
        })
        .await;

    match created {
        Ok(id) => {
            if let Err(e) = db.users().mark_email_verified(id).await {
                error!(error = %e, "Failed to mark staff e-mail as verified");
            }
            println!();
            println!("Staff user created: {}", username);
            println!();
        }
        Err(e) => {
            error!(error = %e, "Failed to create staff user");
            std::process::exit(1);
        }
    }
}

/// Handle the --deactivate-user flag. Existing tokens of the user stop
/// authenticating and refreshing immediately.
pub async fn deactivate_user(db: &Database, username: &str) -> bool {
    let user = match db.users().get_by_username(username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(username = %username, "No such user");
            return false;
        }
        Err(e) => {
            error!(error = %e, "Failed to look up user");
            return false;
        }
    };

    match db.users().set_active(user.id, false).await {
        Ok(_) => {
            info!(user_id = user.id, username = %user.username, "User deactivated");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to deactivate user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, public_origin: &Url, jwt_secret: String) -> ServerConfig {
    let secure_cookies = public_origin.scheme() == "https";

    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        settings: args.auth_settings(secure_cookies),
        claims: args.token_claims.provider(),
        rate_limit: args.auth_rate_limit,
        ip_header: args.ip_header.clone(),
        no_signup: args.no_signup,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
