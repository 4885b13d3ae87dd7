// ABOUTME: Bearer extraction and the ordered authentication chain
// ABOUTME: First strategy to claim the token wins; resource binding is checked afterwards
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use super::AuthStrategy;
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::models::Principal;

/// Outcome of a successful authentication pass.
#[derive(Debug)]
pub struct AuthenticatedRequest {
    pub principal: Principal,
    /// Raw bearer token, needed to bind issued grants to the credential
    pub bearer_token: String,
    /// Which strategy authenticated the token
    pub strategy: &'static str,
}

/// Strip the Bearer scheme from an Authorization header value.
fn extract_bearer(header: Option<&str>) -> BrokerResult<&str> {
    let header = header.ok_or_else(|| {
        BrokerError::new(ErrorKind::NoTokenProvided, "authorization header is required")
    })?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if token.is_empty() {
        return Err(BrokerError::new(
            ErrorKind::NoTokenProvided,
            "authorization header carries no bearer token",
        ));
    }

    Ok(token)
}

/// Run the strategy chain against an Authorization header.
///
/// Strategies are tried in order; the first to produce a principal wins and
/// its resource check runs against `resource_url`.
///
/// # Errors
/// Fails with `NoTokenProvided` for a missing or empty header,
/// `InvalidToken` when no strategy recognizes the token, and whatever the
/// winning strategy's resource check raises.
pub async fn authenticate_request(
    authorization: Option<&str>,
    resource_url: &str,
    strategies: &[&dyn AuthStrategy],
) -> BrokerResult<AuthenticatedRequest> {
    let token = extract_bearer(authorization)?;

    for strategy in strategies {
        match strategy.authenticate(token).await? {
            Some(principal) => {
                strategy.validate_resource_access(token, resource_url).await?;

                tracing::debug!(
                    strategy = strategy.name(),
                    principal = %principal.id,
                    "request authenticated"
                );

                return Ok(AuthenticatedRequest {
                    principal,
                    bearer_token: token.to_owned(),
                    strategy: strategy.name(),
                });
            }
            None => continue,
        }
    }

    Err(BrokerError::invalid_token("token was not recognized"))
}
