//! JWT token generation and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::User;
use crate::settings::AuthSettings;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token, never persisted
    Access,
    /// Longer-lived refresh token, revocable through the blacklist
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// JWT ID
    pub jti: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Claims added by the configured [`ClaimsProvider`]
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// JWT claims for refresh tokens. The JTI is what ends up in the blacklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claims common to both token types, used when the caller accepts either.
#[derive(Debug, Clone, Deserialize)]
pub struct UntypedClaims {
    pub sub: String,
    pub jti: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub exp: u64,
}

/// Supplies the custom claims embedded in every issued token.
pub trait ClaimsProvider: Send + Sync {
    fn claims(&self, user: &User) -> Map<String, Value>;
}

/// Only the registered claims.
pub struct BasicClaims;

impl ClaimsProvider for BasicClaims {
    fn claims(&self, _user: &User) -> Map<String, Value> {
        Map::new()
    }
}

/// Adds `username`, `email` and `is_staff` so clients can render a profile without a lookup.
pub struct ProfileClaims;

impl ClaimsProvider for ProfileClaims {
    fn claims(&self, user: &User) -> Map<String, Value> {
        let mut claims = Map::new();
        claims.insert("username".into(), Value::String(user.username.clone()));
        claims.insert("email".into(), Value::String(user.email.clone()));
        claims.insert("is_staff".into(), Value::Bool(user.is_staff));
        claims
    }
}

/// Claims provider selectable from the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimsKind {
    #[default]
    Basic,
    Profile,
}

impl ClaimsKind {
    pub fn provider(&self) -> Arc<dyn ClaimsProvider> {
        match self {
            ClaimsKind::Basic => Arc::new(BasicClaims),
            ClaimsKind::Profile => Arc::new(ProfileClaims),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_duration: u64,
    refresh_duration: u64,
    claims: Arc<dyn ClaimsProvider>,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    pub jti: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub duration: u64,
}

/// An access/refresh pair minted together on login or registration.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
}

impl JwtConfig {
    /// Create a JWT configuration with the given secret and the lifetimes from `settings`.
    pub fn new(secret: &[u8], settings: &AuthSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_duration: settings.access_token_lifetime.as_secs(),
            refresh_duration: settings.refresh_token_lifetime.as_secs(),
            claims: Arc::new(BasicClaims),
        }
    }

    /// Replace the custom claims provider.
    pub fn with_claims(mut self, claims: Arc<dyn ClaimsProvider>) -> Self {
        self.claims = claims;
        self
    }

    pub fn access_duration(&self) -> u64 {
        self.access_duration
    }

    pub fn refresh_duration(&self) -> u64 {
        self.refresh_duration
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(&self, user: &User) -> Result<AccessTokenResult, JwtError> {
        let now = now_secs()?;
        let jti = uuid::Uuid::new_v4().simple().to_string();
        let exp = now
            .checked_add(self.access_duration)
            .ok_or(JwtError::TimeError)?;

        let claims = AccessClaims {
            sub: user.uuid.clone(),
            jti: jti.clone(),
            token_type: TokenType::Access,
            iat: now,
            exp,
            extra: self.claims.claims(user),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            jti,
            expires_at: exp,
            duration: self.access_duration,
        })
    }

    /// Generate a refresh token for a user, with a fresh JTI.
    pub fn generate_refresh_token(&self, user: &User) -> Result<RefreshTokenResult, JwtError> {
        let now = now_secs()?;
        let jti = uuid::Uuid::new_v4().simple().to_string();
        let exp = now
            .checked_add(self.refresh_duration)
            .ok_or(JwtError::TimeError)?;

        let claims = RefreshClaims {
            sub: user.uuid.clone(),
            jti: jti.clone(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
            extra: self.claims.claims(user),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_duration,
        })
    }

    pub fn generate_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access: self.generate_access_token(user)?,
            refresh: self.generate_refresh_token(user)?,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation())
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token. Does not consult the blacklist.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<RefreshClaims>(token, &self.decoding_key, &validation())
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate signature and expiry of a token of either type.
    pub fn validate_any(&self, token: &str) -> Result<UntypedClaims, JwtError> {
        jsonwebtoken::decode::<UntypedClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(JwtError::Decoding)
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Format a Unix timestamp as an RFC 3339 UTC datetime (`YYYY-MM-DDTHH:MM:SSZ`).
pub fn format_timestamp(timestamp: u64) -> String {
    let days_since_epoch = timestamp / 86400;
    let time_of_day = timestamp % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = days_to_ymd(days_since_epoch as i64);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

/// Convert days since Unix epoch to year, month, day.
fn days_to_ymd(days: i64) -> (i32, u32, u32) {
    // http://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed or expired token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_user() -> User {
        User {
            id: 1,
            uuid: "uuid-123".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            email_verified: false,
            date_joined: "2025-01-01 00:00:00".to_string(),
        }
    }

    fn test_config() -> JwtConfig {
        JwtConfig::new(b"test-secret-key-for-testing", &AuthSettings::default())
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let config = test_config();

        let result = config.generate_access_token(&test_user()).unwrap();
        assert_eq!(result.duration, 5 * 60);

        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, result.jti);
        assert_eq!(claims.exp, result.expires_at);
        assert!(claims.extra.is_empty());
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let config = test_config();

        let result = config.generate_refresh_token(&test_user()).unwrap();
        assert_eq!(result.duration, 24 * 60 * 60);
        assert!(!result.jti.is_empty());

        let claims = config.validate_refresh_token(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, result.jti);
    }

    #[test]
    fn test_lifetimes_follow_settings() {
        let settings = AuthSettings {
            access_token_lifetime: Duration::from_secs(60),
            refresh_token_lifetime: Duration::from_secs(3600),
            ..AuthSettings::default()
        };
        let config = JwtConfig::new(b"secret", &settings);

        let pair = config.generate_pair(&test_user()).unwrap();
        assert_eq!(pair.access.duration, 60);
        assert_eq!(pair.refresh.expires_at - pair.refresh.issued_at, 3600);
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let config = test_config();
        let pair = config.generate_pair(&test_user()).unwrap();

        assert!(matches!(
            config.validate_refresh_token(&pair.access.token),
            Err(JwtError::WrongTokenType)
        ));
        assert!(matches!(
            config.validate_access_token(&pair.refresh.token),
            Err(JwtError::WrongTokenType)
        ));
    }

    #[test]
    fn test_validate_any_accepts_both_types() {
        let config = test_config();
        let pair = config.generate_pair(&test_user()).unwrap();

        let access = config.validate_any(&pair.access.token).unwrap();
        assert_eq!(access.token_type, TokenType::Access);
        let refresh = config.validate_any(&pair.refresh.token).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.jti, pair.refresh.jti);
    }

    #[test]
    fn test_profile_claims_embedded() {
        let config = test_config().with_claims(ClaimsKind::Profile.provider());

        let result = config.generate_access_token(&test_user()).unwrap();
        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.extra["username"], "alice");
        assert_eq!(claims.extra["email"], "alice@example.com");
        assert_eq!(claims.extra["is_staff"], false);
    }

    #[test]
    fn test_invalid_token() {
        let config = test_config();
        assert!(config.validate_access_token("invalid-token").is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let settings = AuthSettings::default();
        let config1 = JwtConfig::new(b"secret-1", &settings);
        let config2 = JwtConfig::new(b"secret-2", &settings);

        let result = config1.generate_access_token(&test_user()).unwrap();
        assert!(config2.validate_access_token(&result.token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let secret = b"test-secret";
        let encoding_key = jsonwebtoken::EncodingKey::from_secret(secret);
        let now = now_secs().unwrap();

        let claims = AccessClaims {
            sub: "uuid-123".to_string(),
            jti: "jti".to_string(),
            token_type: TokenType::Access,
            iat: now - 100,
            exp: now - 50,
            extra: Map::new(),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret, &AuthSettings::default());
        assert!(config.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_unique_jti_per_refresh_token() {
        let config = test_config();
        let user = test_user();

        let result1 = config.generate_refresh_token(&user).unwrap();
        let result2 = config.generate_refresh_token(&user).unwrap();

        assert_ne!(result1.jti, result2.jti);
    }

    #[test]
    fn test_overflowing_lifetime_is_an_error() {
        let settings = AuthSettings {
            refresh_token_lifetime: Duration::from_secs(u64::MAX),
            ..AuthSettings::default()
        };
        let config = JwtConfig::new(b"test-secret-key-for-testing", &settings);

        assert!(matches!(
            config.generate_refresh_token(&test_user()),
            Err(JwtError::TimeError)
        ));
        assert!(config.generate_access_token(&test_user()).is_ok());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1705321845), "2024-01-15T12:30:45Z");
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
    }
}
