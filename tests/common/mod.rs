#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use mentoreed::{
    ServerConfig, create_app,
    db::{Database, NewUser, User},
    jwt::{ClaimsKind, JwtConfig},
    password::hash_password,
    settings::AuthSettings,
};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-with-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    /// Same key and lifetimes as the app, for minting and checking tokens
    pub jwt: JwtConfig,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Builder for test apps with various options
pub struct TestSetup {
    settings: AuthSettings,
    claims: ClaimsKind,
    rate_limit: u32,
    ip_header: Option<&'static str>,
    no_signup: bool,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            settings: AuthSettings::default(),
            claims: ClaimsKind::Basic,
            rate_limit: 0,
            ip_header: None,
            no_signup: false,
        }
    }

    pub fn settings(mut self, f: impl FnOnce(&mut AuthSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn claims(mut self, claims: ClaimsKind) -> Self {
        self.claims = claims;
        self
    }

    pub fn rate_limit(mut self, per_minute: u32, ip_header: &'static str) -> Self {
        self.rate_limit = per_minute;
        self.ip_header = Some(ip_header);
        self
    }

    pub fn no_signup(mut self) -> Self {
        self.no_signup = true;
        self
    }

    pub async fn build(self) -> TestApp {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let jwt = JwtConfig::new(TEST_SECRET, &self.settings).with_claims(self.claims.provider());
        let config = ServerConfig {
            db: db.clone(),
            jwt_secret: TEST_SECRET.to_vec(),
            settings: self.settings,
            claims: self.claims.provider(),
            rate_limit: self.rate_limit,
            ip_header: self.ip_header.map(axum::http::HeaderName::from_static),
            no_signup: self.no_signup,
        };
        TestApp {
            app: create_app(&config),
            db,
            jwt,
        }
    }
}

pub async fn create_test_app() -> TestApp {
    TestSetup::new().build().await
}

/// Insert an active user with [`TEST_PASSWORD`].
pub async fn create_user(db: &Database, username: &str, email: &str) -> User {
    let uuid = uuid::Uuid::new_v4().to_string();
    let hash = hash_password(TEST_PASSWORD).unwrap();
    let id = db
        .users()
        .create(NewUser {
            uuid: &uuid,
            username,
            email,
            password_hash: &hash,
            is_staff: false,
        })
        .await
        .unwrap();
    db.users().get_by_id(id).await.unwrap().unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie set (not cleared) by the response.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(|v| v.to_string())
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=;", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

/// Log in and return the response body and cookies.
pub async fn login(app: &TestApp, username: &str) -> (Value, Vec<String>) {
    let response = app
        .send(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "username": username, "password": TEST_PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), 200);
    let cookies = extract_set_cookies(&response);
    (body_json(response).await, cookies)
}
