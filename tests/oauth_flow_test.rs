// ABOUTME: End-to-end authorization code + PKCE flow through the HTTP surface
// ABOUTME: Registration, approval, exchange, single-use enforcement, rotation, revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

mod common;

use axum::http::{header, StatusCode};
use common::{
    get, internal_token, json_body, location, obtain_code, pkce_pair, post_form, post_json,
    query_param, register_client, setup_router,
};

const REDIRECT_URI: &str = "https://app.example/cb";

#[tokio::test]
async fn test_full_authorization_code_flow() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();

    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], "profile");
    assert_eq!(body["user"]["id"], "user-1");
    assert!(body["access_token"].as_str().unwrap().len() > 32);
    assert!(body["refresh_token"].as_str().unwrap().len() > 32);
}

#[tokio::test]
async fn test_authorization_code_is_single_use() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let form = [
        ("grant_type", "authorization_code"),
        ("client_id", client_id.as_str()),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
        ("code_verifier", verifier.as_str()),
    ];

    let response = post_form(&router, "/oauth/token", &form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_form(&router, "/oauth/token", &form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_wrong_verifier_rejected_and_code_burned() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", &"a".repeat(43)),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");

    // The failed attempt consumed the code; the right verifier is too late
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_code_bound_to_client_and_redirect() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let other_client = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", other_client.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_rotates_and_invalidates_old_token() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    let first = json_body(response).await;
    let first_refresh = first["refresh_token"].as_str().unwrap().to_owned();

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", first_refresh.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await;

    assert_ne!(second["access_token"], first["access_token"]);
    assert_ne!(second["refresh_token"], first["refresh_token"]);
    assert_eq!(second["scope"], first["scope"]);

    // The rotated-out refresh token is dead
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", first_refresh.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_bound_to_client() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let other_client = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    let tokens = json_body(response).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    // The wrong client neither refreshes nor destroys the connection
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", other_client.as_str()),
            ("refresh_token", refresh_token),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", refresh_token),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_scope_narrowing_never_widens() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();

    // Grant covers two scopes
    let authorize_uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope=profile%20accounts:read&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode(&client_id),
        urlencoding::encode(REDIRECT_URI),
        urlencoding::encode(&challenge),
    );
    let approval_url = location(&get(&router, &authorize_uri).await);
    let request_id = query_param(&approval_url, "request_id").unwrap();

    let response = post_json(
        &router,
        &format!("/oauth/requests/{request_id}/approve"),
        &serde_json::json!({}),
        Some(&internal_token("user-1")),
    )
    .await;
    let body = json_body(response).await;
    let code = query_param(body["redirect_url"].as_str().unwrap(), "code").unwrap();

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    let tokens = json_body(response).await;
    assert_eq!(tokens["scope"], "profile accounts:read");

    // Ask for one original scope plus one never granted
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", tokens["refresh_token"].as_str().unwrap()),
            ("scope", "profile transactions:write"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let narrowed = json_body(response).await;
    assert_eq!(narrowed["scope"], "profile");
}

#[tokio::test]
async fn test_revocation_is_idempotent_and_silent() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    let tokens = json_body(response).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    for token in [refresh_token, refresh_token, "never-issued"] {
        // Revoking twice, or revoking garbage, reveals nothing
        let response = post_form(
            &router,
            "/oauth/revoke",
            &[
                ("token", token),
                ("token_type_hint", "refresh_token"),
                ("client_id", client_id.as_str()),
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The revoked connection is gone
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", refresh_token),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_token_hint_never_touches_access_tokens() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (verifier, challenge) = pkce_pair();
    let code = obtain_code(&router, &client_id, REDIRECT_URI, &challenge).await;

    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await;
    let tokens = json_body(response).await;
    let access_token = tokens["access_token"].as_str().unwrap();
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    // Hinted as a refresh token, the access-token value matches nothing and
    // no fallback lookup runs
    let response = post_form(
        &router,
        "/oauth/revoke",
        &[
            ("token", access_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", client_id.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The connection survived
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("refresh_token", refresh_token),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let router = setup_router().await;
    let response = post_form(
        &router,
        "/oauth/token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "fiscus-web"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_approve_requires_authentication() {
    let router = setup_router().await;

    let response = post_json(
        &router,
        "/oauth/requests/some-request/approve",
        &serde_json::json!({}),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .expect("challenge header")
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Bearer realm="));
    assert!(challenge.contains("/.well-known/oauth-protected-resource"));
}

#[tokio::test]
async fn test_deny_redirects_with_access_denied() {
    let router = setup_router().await;
    let client_id = register_client(&router, REDIRECT_URI).await;
    let (_, challenge) = pkce_pair();

    let authorize_uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&state=cs9&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode(&client_id),
        urlencoding::encode(REDIRECT_URI),
        urlencoding::encode(&challenge),
    );
    let approval_url = location(&get(&router, &authorize_uri).await);
    let request_id = query_param(&approval_url, "request_id").unwrap();

    let response = post_json(
        &router,
        &format!("/oauth/requests/{request_id}/deny"),
        &serde_json::json!({}),
        Some(&internal_token("user-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let redirect_url = body["redirect_url"].as_str().unwrap();
    assert!(redirect_url.starts_with(REDIRECT_URI));
    assert_eq!(
        query_param(redirect_url, "error").as_deref(),
        Some("access_denied")
    );
    assert_eq!(query_param(redirect_url, "state").as_deref(), Some("cs9"));

    // Terminal states cannot flip
    let response = post_json(
        &router,
        &format!("/oauth/requests/{request_id}/approve"),
        &serde_json::json!({}),
        Some(&internal_token("user-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_request_approval_404() {
    let router = setup_router().await;
    let response = post_json(
        &router,
        "/oauth/requests/no-such-request/approve",
        &serde_json::json!({}),
        Some(&internal_token("user-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
