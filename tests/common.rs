// ABOUTME: Shared helpers for integration tests
// ABOUTME: In-memory broker setup, request builders, and token helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

#![allow(dead_code)] // not every test binary uses every helper

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use fiscus_auth_broker::config::ServerConfig;
use fiscus_auth_broker::{routes, BrokerResources};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const ISSUER: &str = "http://127.0.0.1:8081";
pub const INTERNAL_SECRET: &[u8] = b"integration-test-internal-secret";
pub const STATE_SECRET: &[u8] = b"integration-test-state-secret-32";

/// Test configuration with no upstream provider: authorize requests go
/// through the local approval queue.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_owned(),
        http_port: 8081,
        issuer_url: ISSUER.to_owned(),
        approval_page_url: format!("{ISSUER}/authorize"),
        builtin_redirect_uri: format!("{ISSUER}/auth/callback"),
        database_url: "sqlite::memory:".to_owned(),
        state_secret: STATE_SECRET.to_vec(),
        internal_token_secret: INTERNAL_SECRET.to_vec(),
        sweep_interval: Duration::from_secs(300),
        upstream: None,
    }
}

/// Build broker resources over a fresh in-memory database.
pub async fn setup_resources() -> Arc<BrokerResources> {
    // One connection: every pool checkout must see the same :memory: db
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");

    let resources = BrokerResources::new(test_config(), pool).expect("broker resources");
    resources.migrate().await.expect("schema migration");
    Arc::new(resources)
}

/// Build the router over fresh resources.
pub async fn setup_router() -> Router {
    routes::routes(setup_resources().await)
}

/// Mint an internal HS256 token as the first-party backend would. The
/// audience claim covers the broker itself so the approval endpoints pass
/// the resource check.
pub fn internal_token(sub: &str) -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        sub: String,
        name: String,
        aud: String,
        exp: i64,
    }

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &Claims {
            sub: sub.to_owned(),
            name: "Test User".to_owned(),
            aud: format!("{ISSUER}/*"),
            exp: chrono::Utc::now().timestamp() + 3600,
        },
        &jsonwebtoken::EncodingKey::from_secret(INTERNAL_SECRET),
    )
    .expect("token signing")
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

pub async fn post_json(
    router: &Router,
    uri: &str,
    body: &serde_json::Value,
    bearer: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    router
        .clone()
        .oneshot(
            builder
                .body(Body::from(serde_json::to_vec(body).expect("json body")))
                .expect("request"),
        )
        .await
        .expect("response")
}

pub async fn post_form(router: &Router, uri: &str, fields: &[(&str, &str)]) -> Response<Body> {
    let body = serde_urlencoded::to_string(fields).expect("form body");

    router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response")
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Location header of a 302 redirect response.
pub fn location(response: &Response<Body>) -> String {
    assert_eq!(response.status(), StatusCode::FOUND, "expected a redirect");
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .expect("utf-8 location")
        .to_owned()
}

/// Extract one query parameter from a URL.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .expect("parseable url")
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Register a client through the HTTP surface and return its client_id.
pub async fn register_client(router: &Router, redirect_uri: &str) -> String {
    let response = post_json(
        router,
        "/oauth/register",
        &serde_json::json!({
            "redirect_uris": [redirect_uri],
            "client_name": "Test Client",
            "scope": "profile accounts:read",
        }),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    body["client_id"].as_str().expect("client_id").to_owned()
}

/// A PKCE verifier/challenge pair for tests.
pub fn pkce_pair() -> (String, String) {
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_owned();
    let challenge = fiscus_auth_broker::pkce::derive_challenge(&verifier).expect("challenge");
    (verifier, challenge)
}

/// Walk a client through authorize + approval and return the issued code.
pub async fn obtain_code(router: &Router, client_id: &str, redirect_uri: &str, challenge: &str) -> String {
    let authorize_uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope=profile&state=cs1&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(challenge),
    );
    let response = get(router, &authorize_uri).await;
    let approval_url = location(&response);
    let request_id = query_param(&approval_url, "request_id").expect("request_id");

    let response = post_json(
        router,
        &format!("/oauth/requests/{request_id}/approve"),
        &serde_json::json!({}),
        Some(&internal_token("user-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let redirect_url = body["redirect_url"].as_str().expect("redirect_url");
    assert_eq!(query_param(redirect_url, "state").as_deref(), Some("cs1"));
    query_param(redirect_url, "code").expect("authorization code")
}
