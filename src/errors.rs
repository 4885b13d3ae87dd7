// ABOUTME: Unified error taxonomy for the authorization broker
// ABOUTME: Maps every failure kind to an HTTP status and an RFC 6749 wire code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure kinds the broker can surface.
///
/// Each kind carries a fixed HTTP status and a fixed OAuth 2.0 wire code so
/// that no handler can leak more detail than the taxonomy allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    // Request validation
    #[serde(rename = "INVALID_REQUEST")]
    InvalidRequest,
    #[serde(rename = "INVALID_CLIENT")]
    InvalidClient,
    #[serde(rename = "INVALID_REDIRECT_URI")]
    InvalidRedirectUri,
    #[serde(rename = "UNSUPPORTED_GRANT_TYPE")]
    UnsupportedGrantType,

    // Signed state
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "EXPIRED_STATE")]
    ExpiredState,

    // Authorization codes and PKCE
    #[serde(rename = "INVALID_GRANT")]
    InvalidGrant,
    #[serde(rename = "EXPIRED_GRANT")]
    ExpiredGrant,
    #[serde(rename = "INVALID_CODE_VERIFIER")]
    InvalidCodeVerifier,
    #[serde(rename = "UNSUPPORTED_CHALLENGE_METHOD")]
    UnsupportedChallengeMethod,

    // Refresh tokens
    #[serde(rename = "INVALID_REFRESH_TOKEN")]
    InvalidRefreshToken,
    #[serde(rename = "EXPIRED_REFRESH_TOKEN")]
    ExpiredRefreshToken,

    // Bearer-token validation
    #[serde(rename = "NO_TOKEN_PROVIDED")]
    NoTokenProvided,
    #[serde(rename = "INVALID_TOKEN")]
    InvalidToken,
    #[serde(rename = "INVALID_AUDIENCE")]
    InvalidAudience,

    // Pending approval requests
    #[serde(rename = "REQUEST_NOT_FOUND")]
    RequestNotFound,
    #[serde(rename = "REQUEST_EXPIRED")]
    RequestExpired,
    #[serde(rename = "REQUEST_ALREADY_PROCESSED")]
    RequestAlreadyProcessed,

    // Collaborators
    #[serde(rename = "UPSTREAM_UNAVAILABLE")]
    UpstreamUnavailable,
    #[serde(rename = "REGISTRATION_FAILED")]
    RegistrationFailed,
    #[serde(rename = "STORAGE_ERROR")]
    Storage,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind surfaces as.
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidRequest
            | Self::InvalidRedirectUri
            | Self::UnsupportedGrantType
            | Self::InvalidState
            | Self::ExpiredState
            | Self::InvalidGrant
            | Self::ExpiredGrant
            | Self::InvalidCodeVerifier
            | Self::UnsupportedChallengeMethod
            | Self::InvalidRefreshToken
            | Self::ExpiredRefreshToken
            | Self::RequestExpired => StatusCode::BAD_REQUEST,

            Self::InvalidClient | Self::NoTokenProvided | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }

            Self::InvalidAudience => StatusCode::FORBIDDEN,
            Self::RequestNotFound => StatusCode::NOT_FOUND,
            Self::RequestAlreadyProcessed => StatusCode::CONFLICT,
            Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,

            Self::RegistrationFailed | Self::Storage | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// OAuth 2.0 error code used on the wire (RFC 6749 §5.2, RFC 6750 §3.1).
    #[must_use]
    pub const fn wire_code(self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::InvalidRedirectUri
            | Self::InvalidState
            | Self::ExpiredState
            | Self::UnsupportedChallengeMethod
            | Self::RequestNotFound
            | Self::RequestExpired
            | Self::RequestAlreadyProcessed => "invalid_request",

            Self::InvalidClient => "invalid_client",

            Self::InvalidGrant
            | Self::ExpiredGrant
            | Self::InvalidCodeVerifier
            | Self::InvalidRefreshToken
            | Self::ExpiredRefreshToken => "invalid_grant",

            Self::UnsupportedGrantType => "unsupported_grant_type",

            Self::NoTokenProvided | Self::InvalidToken | Self::InvalidAudience => "invalid_token",

            Self::UpstreamUnavailable => "temporarily_unavailable",

            Self::RegistrationFailed | Self::Storage | Self::Internal => "server_error",
        }
    }
}

/// Unified error type for broker operations.
#[derive(Debug, Error)]
pub struct BrokerError {
    /// Taxonomy kind
    pub kind: ErrorKind,
    /// Human-readable message (safe for clients; never includes token material)
    pub message: String,
    /// Source error for chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error for chaining.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClient, message)
    }

    pub fn invalid_redirect_uri(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRedirectUri, message)
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGrant, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidToken, message)
    }

    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAudience, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        self.kind.http_status()
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.wire_code(), self.message)
    }
}

impl From<sqlx::Error> for BrokerError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorKind::Storage, "database operation failed").with_source(error)
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// OAuth 2.0 error response body (RFC 6749 §5.2).
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Wire error code
    pub error: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&BrokerError> for OAuthErrorResponse {
    fn from(error: &BrokerError) -> Self {
        Self {
            error: error.kind.wire_code().to_owned(),
            error_description: Some(error.message.clone()),
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(kind = ?self.kind, error = %self, "broker operation failed");
        }
        let body = OAuthErrorResponse::from(&self);
        (status, Json(body)).into_response()
    }
}
