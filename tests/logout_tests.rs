//! Tests for logout and refresh token revocation.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    TestSetup, body_json, cookie_value, create_test_app, create_user, extract_set_cookies,
    has_cleared_cookie, json_request, login,
};
use mentoreed::settings::CookieSettings;
use serde_json::json;

const LOGOUT: &str = "/api/v1/auth/logout";
const REFRESH: &str = "/api/v1/auth/refresh";

fn with_refresh_cookie(uri: &str, refresh_token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, format!("refresh_token={}", refresh_token))
        .body(Body::empty())
        .unwrap()
}

fn assert_cookies_cleared(response: &axum::http::Response<Body>) {
    let cookies = extract_set_cookies(response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
}

#[tokio::test]
async fn test_logout_blacklists_refresh_token() {
    let app = create_test_app().await;
    create_user(&app.db, "alice", "alice@example.com").await;
    let (_, cookies) = login(&app, "alice").await;
    let refresh = cookie_value(&cookies, "refresh_token").unwrap();

    let response = app.send(with_refresh_cookie(LOGOUT, &refresh)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cookies_cleared(&response);
    assert_eq!(
        body_json(response).await["detail"],
        "Successfully logged out."
    );

    let claims = app.jwt.validate_refresh_token(&refresh).unwrap();
    assert!(app.db.blacklist().is_blacklisted(&claims.jti).await.unwrap());

    let response = app.send(with_refresh_cookie(REFRESH, &refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_twice_is_rejected() {
    let app = create_test_app().await;
    create_user(&app.db, "alice", "alice@example.com").await;
    let (_, cookies) = login(&app, "alice").await;
    let refresh = cookie_value(&cookies, "refresh_token").unwrap();

    let response = app.send(with_refresh_cookie(LOGOUT, &refresh)).await;
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..2 {
        let response = app.send(with_refresh_cookie(LOGOUT, &refresh)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_cookies_cleared(&response);
        assert_eq!(body_json(response).await["detail"], "Token is blacklisted");
    }
}

#[tokio::test]
async fn test_logout_without_token_is_a_no_op() {
    let app = create_test_app().await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri(LOGOUT)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cookies_cleared(&response);
    assert_eq!(
        body_json(response).await["detail"],
        "Successfully logged out."
    );
}

#[tokio::test]
async fn test_logout_with_invalid_token() {
    let app = create_test_app().await;

    let response = app.send(with_refresh_cookie(LOGOUT, "garbage")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_cookies_cleared(&response);
    assert_eq!(
        body_json(response).await["detail"],
        "Token is invalid or expired"
    );
}

#[tokio::test]
async fn test_logout_reads_body_without_httponly() {
    let app = TestSetup::new()
        .settings(|s| s.refresh_cookie.http_only = false)
        .build()
        .await;
    create_user(&app.db, "alice", "alice@example.com").await;
    let (body, _) = login(&app, "alice").await;
    let refresh = body["refresh"].as_str().unwrap().to_string();

    // The cookie is ignored in body mode
    let response = app.send(with_refresh_cookie(LOGOUT, &refresh)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let claims = app.jwt.validate_refresh_token(&refresh).unwrap();
    assert!(!app.db.blacklist().is_blacklisted(&claims.jti).await.unwrap());

    let response = app
        .send(json_request("POST", LOGOUT, json!({ "refresh": refresh })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.db.blacklist().is_blacklisted(&claims.jti).await.unwrap());
}

#[tokio::test]
async fn test_logout_without_blacklist() {
    let app = TestSetup::new()
        .settings(|s| s.blacklist_enabled = false)
        .build()
        .await;
    create_user(&app.db, "alice", "alice@example.com").await;
    let (_, cookies) = login(&app, "alice").await;
    let refresh = cookie_value(&cookies, "refresh_token").unwrap();

    let response = app.send(with_refresh_cookie(LOGOUT, &refresh)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cookies_cleared(&response);

    let claims = app.jwt.validate_refresh_token(&refresh).unwrap();
    assert!(!app.db.blacklist().is_blacklisted(&claims.jti).await.unwrap());
}

#[tokio::test]
async fn test_logout_warns_without_cookies_or_blacklist() {
    let app = TestSetup::new()
        .settings(|s| {
            s.blacklist_enabled = false;
            s.access_cookie = CookieSettings::disabled();
            s.refresh_cookie = CookieSettings::disabled();
        })
        .build()
        .await;

    let response = app.send(json_request("POST", LOGOUT, json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());

    let detail = body_json(response).await["detail"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(detail.contains("has not been deleted server side"));
}
