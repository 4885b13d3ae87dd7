// ABOUTME: OAuth endpoint handlers: authorize, callback, token, revoke, register, approvals
// ABOUTME: Thin HTTP adapters over the broker; 401s carry the WWW-Authenticate challenge
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::auth::authenticate_request;
use crate::context::BrokerResources;
use crate::errors::BrokerError;
use crate::models::{
    ApprovalResponse, AuthorizeQuery, CallbackQuery, ClientRegistrationRequest,
    ClientRegistrationResponse, RevokeRequest, TokenRequest, TokenResponse,
};
use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderMap, AUTHORIZATION, LOCATION, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use std::sync::Arc;

/// 302 Found redirect. `axum::response::Redirect` only offers 303/307/308,
/// and user-agent flows here use the classic 302.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_owned())]).into_response()
}

/// Convert a broker error into a response, attaching the RFC 6750 bearer
/// challenge when the status is 401.
fn error_response(resources: &BrokerResources, error: BrokerError) -> Response {
    let status = error.http_status();
    let mut response = error.into_response();

    if status == StatusCode::UNAUTHORIZED {
        let challenge = format!(
            "Bearer realm=\"{}\"",
            resources.config.protected_resource_metadata_url()
        );
        if let Ok(value) = challenge.parse() {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
    }

    response
}

/// GET /oauth/authorize
pub async fn authorize(
    State(resources): State<Arc<BrokerResources>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    match resources.broker.authorize(query).await {
        Ok(url) => found(&url),
        Err(error) => error_response(&resources, error),
    }
}

/// GET /oauth/callback
pub async fn callback(
    State(resources): State<Arc<BrokerResources>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match resources.broker.callback(query).await {
        Ok(url) => found(&url),
        Err(error) => error_response(&resources, error),
    }
}

/// POST /oauth/token
pub async fn token(
    State(resources): State<Arc<BrokerResources>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, Response> {
    resources
        .broker
        .token(request)
        .await
        .map(Json)
        .map_err(|error| error_response(&resources, error))
}

/// POST /oauth/revoke (RFC 7009). Responds 200 whether or not the token
/// existed.
pub async fn revoke(
    State(resources): State<Arc<BrokerResources>>,
    Form(request): Form<RevokeRequest>,
) -> Response {
    match resources.broker.revoke(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => error_response(&resources, error),
    }
}

/// POST /oauth/register (RFC 7591)
pub async fn register(
    State(resources): State<Arc<BrokerResources>>,
    Json(request): Json<ClientRegistrationRequest>,
) -> Response {
    match resources.broker.registry().register(request).await {
        Ok(client) => {
            let body = ClientRegistrationResponse::from(&client);
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(error) => error_response(&resources, error),
    }
}

/// POST /oauth/requests/{request_id}/approve
///
/// Requires an authenticated resource owner; the issued code is bound to
/// the presented credential.
pub async fn approve(
    State(resources): State<Arc<BrokerResources>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let authenticated = match authenticate_request(
        authorization,
        &resources.config.issuer_url,
        &resources.auth_strategies(),
    )
    .await
    {
        Ok(authenticated) => authenticated,
        Err(error) => return error_response(&resources, error),
    };

    match resources
        .broker
        .approve_request(
            &request_id,
            authenticated.principal,
            &authenticated.bearer_token,
        )
        .await
    {
        Ok(redirect_url) => Json(ApprovalResponse { redirect_url }).into_response(),
        Err(error) => error_response(&resources, error),
    }
}

/// POST /oauth/requests/{request_id}/deny
pub async fn deny(
    State(resources): State<Arc<BrokerResources>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    if let Err(error) = authenticate_request(
        authorization,
        &resources.config.issuer_url,
        &resources.auth_strategies(),
    )
    .await
    {
        return error_response(&resources, error);
    }

    match resources.broker.deny_request(&request_id).await {
        Ok(redirect_url) => Json(ApprovalResponse { redirect_url }).into_response(),
        Err(error) => error_response(&resources, error),
    }
}
