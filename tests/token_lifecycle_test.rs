// ABOUTME: Grant-expiry and upstream-outage behavior driven through the broker directly
// ABOUTME: Expired codes fail at redemption; a transient IdP outage never burns a refresh token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

mod common;

use chrono::{Duration, Utc};
use fiscus_auth_broker::config::UpstreamIdpConfig;
use fiscus_auth_broker::models::{
    AuthorizationCode, Principal, TokenConnection, TokenRequest, TokenSource,
};
use fiscus_auth_broker::registry::ClientRegistry;
use fiscus_auth_broker::store::pending::PendingRequestStore;
use fiscus_auth_broker::store::TokenStore;
use fiscus_auth_broker::{AuthorizationBroker, ErrorKind, ServerConfig};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

const CLIENT_ID: &str = "fiscus-web";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

async fn setup_broker(config: ServerConfig) -> (AuthorizationBroker, TokenStore) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");

    let store = TokenStore::new(pool.clone());
    store.migrate().await.expect("schema migration");

    let broker = AuthorizationBroker::new(
        Arc::new(config),
        ClientRegistry::new(pool),
        store.clone(),
        PendingRequestStore::new(),
    )
    .expect("broker");

    (broker, store)
}

fn principal() -> Principal {
    Principal {
        id: "user-1".into(),
        handle: Some("user-1".into()),
        display_name: None,
        roles: Vec::new(),
        provider: "github".into(),
        profile: serde_json::Value::Null,
    }
}

/// Upstream block whose endpoints refuse connections immediately.
fn unreachable_upstream() -> UpstreamIdpConfig {
    UpstreamIdpConfig {
        provider_name: "github".into(),
        client_id: "broker-id".into(),
        client_secret: "broker-secret".into(),
        authorize_url: "http://127.0.0.1:1/authorize".into(),
        token_url: "http://127.0.0.1:1/token".into(),
        profile_url: "http://127.0.0.1:1/user".into(),
        scope: "read:user".into(),
        request_timeout: std::time::Duration::from_secs(2),
    }
}

fn refresh_request(refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".into(),
        client_id: CLIENT_ID.into(),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        refresh_token: Some(refresh_token.to_owned()),
        scope: None,
        resource: None,
    }
}

#[tokio::test]
async fn test_expired_code_rejected_at_redemption() {
    let (broker, store) = setup_broker(common::test_config()).await;
    let redirect_uri = common::test_config().builtin_redirect_uri;

    let challenge = fiscus_auth_broker::pkce::derive_challenge(VERIFIER).unwrap();
    store
        .store_code(&AuthorizationCode {
            code: "stale-code".into(),
            client_id: CLIENT_ID.into(),
            redirect_uri: redirect_uri.clone(),
            code_challenge: challenge,
            code_challenge_method: "S256".into(),
            scope: "profile".into(),
            bound_access_token: "internal-token".into(),
            token_source: TokenSource::Local,
            principal: principal(),
            resource: None,
            expires_at: Utc::now() - Duration::seconds(30),
        })
        .await
        .unwrap();

    let err = broker
        .token(TokenRequest {
            grant_type: "authorization_code".into(),
            client_id: CLIENT_ID.into(),
            code: Some("stale-code".into()),
            redirect_uri: Some(redirect_uri),
            code_verifier: Some(VERIFIER.into()),
            refresh_token: None,
            scope: None,
            resource: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ExpiredGrant);

    // The expired code was still consumed
    assert!(store.consume_code("stale-code").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upstream_outage_does_not_burn_refresh_token() {
    let mut config = common::test_config();
    config.upstream = Some(unreachable_upstream());
    let (broker, store) = setup_broker(config).await;

    let now = Utc::now();
    let connection = TokenConnection {
        access_token: "at-1".into(),
        refresh_token: "rt-1".into(),
        client_id: CLIENT_ID.into(),
        scope: "profile".into(),
        token_source: TokenSource::Upstream,
        bound_access_token: "upstream-token".into(),
        principal: principal(),
        resource: None,
        expires_at: now + Duration::hours(1),
        refresh_expires_at: now + Duration::days(7),
        created_at: now,
    };
    store.store_connection(&connection).await.unwrap();

    // The IdP is unreachable: the refresh fails as retryable
    let err = broker.token(refresh_request("rt-1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);

    // And the connection is still there for the retry
    let restored = store
        .get_connection_by_access_token("at-1")
        .await
        .unwrap()
        .expect("connection restored after outage");
    assert_eq!(restored.refresh_token, "rt-1");

    let err = broker.token(refresh_request("rt-1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn test_local_refresh_skips_upstream_validation() {
    // Upstream configured but the pair is locally sourced: no IdP call runs
    let mut config = common::test_config();
    config.upstream = Some(unreachable_upstream());
    let (broker, store) = setup_broker(config).await;

    let now = Utc::now();
    store
        .store_connection(&TokenConnection {
            access_token: "at-2".into(),
            refresh_token: "rt-2".into(),
            client_id: CLIENT_ID.into(),
            scope: "profile".into(),
            token_source: TokenSource::Local,
            bound_access_token: "internal-token".into(),
            principal: principal(),
            resource: None,
            expires_at: now + Duration::hours(1),
            refresh_expires_at: now + Duration::days(7),
            created_at: now,
        })
        .await
        .unwrap();

    let response = broker.token(refresh_request("rt-2")).await.unwrap();
    assert_ne!(response.refresh_token, "rt-2");
}
