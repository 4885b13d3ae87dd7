// ABOUTME: HTTP router assembly and the well-known metadata documents
// ABOUTME: Protocol endpoint handlers live in oauth2.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::constants::{lifetimes, protocol, scopes};
use crate::context::BrokerResources;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub mod oauth2;

/// Assemble the full broker router.
pub fn routes(resources: Arc<BrokerResources>) -> Router {
    Router::new()
        .route("/oauth/authorize", get(oauth2::authorize))
        .route("/oauth/callback", get(oauth2::callback))
        .route("/oauth/token", post(oauth2::token))
        .route("/oauth/revoke", post(oauth2::revoke))
        .route("/oauth/register", post(oauth2::register))
        .route("/oauth/requests/:request_id/approve", post(oauth2::approve))
        .route("/oauth/requests/:request_id/deny", post(oauth2::deny))
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .with_state(resources)
}

/// GET /.well-known/oauth-authorization-server (RFC 8414).
///
/// Lifetimes advertised here are the same constants issuance uses.
async fn authorization_server_metadata(
    State(resources): State<Arc<BrokerResources>>,
) -> Json<serde_json::Value> {
    let issuer = &resources.config.issuer_url;

    Json(serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "revocation_endpoint": format!("{issuer}/oauth/revoke"),
        "registration_endpoint": format!("{issuer}/oauth/register"),
        "response_types_supported": [protocol::RESPONSE_TYPE_CODE],
        "grant_types_supported": [
            protocol::GRANT_AUTHORIZATION_CODE,
            protocol::GRANT_REFRESH_TOKEN,
        ],
        "code_challenge_methods_supported": [protocol::CHALLENGE_METHOD_S256],
        "token_endpoint_auth_methods_supported": ["none"],
        "scopes_supported": scopes::SUPPORTED,
        "access_token_lifetime_seconds": lifetimes::ACCESS_TOKEN_SECS,
        "refresh_token_lifetime_days": lifetimes::REFRESH_TOKEN_DAYS,
    }))
}

/// GET /.well-known/oauth-protected-resource (RFC 9728).
async fn protected_resource_metadata(
    State(resources): State<Arc<BrokerResources>>,
) -> Json<serde_json::Value> {
    let issuer = &resources.config.issuer_url;

    Json(serde_json::json!({
        "resource": issuer,
        "authorization_servers": [issuer],
        "scopes_supported": scopes::SUPPORTED,
        "bearer_methods_supported": ["header"],
    }))
}
