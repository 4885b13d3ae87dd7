// ABOUTME: Core data model and wire types for the authorization broker
// ABOUTME: Registered clients, authorization codes, token connections, principals, and RFC 7591/6749 DTOs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated identity attached to codes, connections, and requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    /// Stable subject identifier
    pub id: String,
    /// Short handle (login name) when the provider supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Human-readable display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Roles granted by the identity source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Identity source ("local" or the upstream provider name)
    pub provider: String,
    /// Profile snapshot as returned by the identity source
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub profile: serde_json::Value,
}

/// Compact principal view returned in token responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub provider: String,
}

impl From<&Principal> for PrincipalSummary {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id.clone(),
            handle: principal.handle.clone(),
            display_name: principal.display_name.clone(),
            provider: principal.provider.clone(),
        }
    }
}

/// Where a token pair's backing credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// Backed by an upstream identity-provider access token
    Upstream,
    /// Issued from a local passkey-authenticated approval
    Local,
}

impl TokenSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => crate::constants::token_sources::UPSTREAM,
            Self::Local => crate::constants::token_sources::LOCAL,
        }
    }

    /// Parse a persisted value; unknown values fall back to `Local`.
    #[must_use]
    pub fn from_str_or_local(value: &str) -> Self {
        match value {
            crate::constants::token_sources::UPSTREAM => Self::Upstream,
            _ => Self::Local,
        }
    }
}

/// Dynamically registered OAuth client (public, PKCE-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    /// Opaque unique client identifier
    pub client_id: String,
    /// Absolute redirect URIs, non-empty
    pub redirect_uris: Vec<String>,
    /// Display name supplied at registration
    pub client_name: Option<String>,
    /// Fixed to "none" — public clients only
    pub auth_method: String,
    /// Fixed to ["authorization_code"]
    pub grant_types: Vec<String>,
    /// Fixed to ["code"]
    pub response_types: Vec<String>,
    /// Scope string supplied at registration
    pub scope: Option<String>,
    /// Registration timestamp
    pub issued_at: DateTime<Utc>,
}

/// Single-use authorization code bound to a PKCE challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Opaque code value, consumed exactly once
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    /// Fixed "S256"
    pub code_challenge_method: String,
    pub scope: String,
    /// Upstream access token (federated flow) or internal token (local flow)
    pub bound_access_token: String,
    /// Which flow issued this code
    pub token_source: TokenSource,
    /// Principal snapshot captured at issuance
    pub principal: Principal,
    /// Optional bound audience (RFC 8707 resource indicator)
    pub resource: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Access/refresh token pair with its principal and audience binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConnection {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub scope: String,
    pub token_source: TokenSource,
    /// Credential this pair is backed by, re-validated on refresh for
    /// upstream-sourced pairs
    pub bound_access_token: String,
    pub principal: Principal,
    pub resource: Option<String>,
    /// Access-token expiry
    pub expires_at: DateTime<Utc>,
    /// Refresh-token expiry
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Status of an in-flight local approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Approved,
    Denied,
}

/// In-flight authorization request awaiting local approval or denial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorizationRequest {
    pub request_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    /// Opaque state supplied by the client, echoed back on completion
    pub client_state: Option<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub resource: Option<String>,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Client registration request (RFC 7591).
#[derive(Debug, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for the authorization code flow
    pub redirect_uris: Vec<String>,
    /// Optional client name for display
    pub client_name: Option<String>,
    /// Scopes the client intends to request
    pub scope: Option<String>,
}

/// Client registration response (RFC 7591).
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    pub client_id_issued_at: i64,
    pub redirect_uris: Vec<String>,
    /// Always "none" — public clients authenticate with PKCE only
    pub token_endpoint_auth_method: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<&RegisteredClient> for ClientRegistrationResponse {
    fn from(client: &RegisteredClient) -> Self {
        Self {
            client_id: client.client_id.clone(),
            client_id_issued_at: client.issued_at.timestamp(),
            redirect_uris: client.redirect_uris.clone(),
            token_endpoint_auth_method: client.auth_method.clone(),
            grant_types: client.grant_types.clone(),
            response_types: client.response_types.clone(),
            client_name: client.client_name.clone(),
            scope: client.scope.clone(),
        }
    }
}

/// Authorization request query parameters (GET /oauth/authorize).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// RFC 8707 resource indicator
    pub resource: Option<String>,
}

/// Upstream IdP callback query parameters (GET /oauth/callback).
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Token request form body (POST /oauth/token).
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: String,
    pub client_id: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI, must match the one bound to the code
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// Optional scope narrowing on refresh
    pub scope: Option<String>,
    /// RFC 8707 resource indicator
    pub resource: Option<String>,
}

/// Token response (RFC 6749 §5.1, plus a principal snapshot).
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub scope: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    pub refresh_token: String,
    /// Snapshot of the authorized principal
    pub user: PrincipalSummary,
}

/// Revocation request form body (POST /oauth/revoke, RFC 7009).
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    /// "access_token" or "refresh_token"
    pub token_type_hint: Option<String>,
    pub client_id: String,
}

/// Approval/denial response carrying the client redirect target.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalResponse {
    /// Where the user agent should be sent to complete the flow
    pub redirect_url: String,
}
