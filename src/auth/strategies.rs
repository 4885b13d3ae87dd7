// ABOUTME: Concrete authentication strategies for the approval endpoints
// ABOUTME: HS256 internal tokens and broker-issued opaque access tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use super::AuthStrategy;
use crate::broker::AuthorizationBroker;
use crate::errors::{BrokerError, BrokerResult};
use crate::models::Principal;
use crate::resource;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

/// Claims carried by internally issued signed tokens.
#[derive(Debug, Deserialize)]
struct InternalClaims {
    /// Subject (user id)
    sub: String,
    /// Display name
    #[serde(default)]
    name: Option<String>,
    /// Roles granted by the first-party backend
    #[serde(default)]
    roles: Vec<String>,
    /// Audience the token is scoped to; required for resource access
    #[serde(default)]
    aud: Option<String>,
}

/// Validates HS256 tokens issued by the first-party Fiscus backend.
///
/// These authenticate the resource owner on the approval endpoints when no
/// upstream provider is configured.
pub struct InternalTokenStrategy {
    decoding_key: DecodingKey,
}

impl InternalTokenStrategy {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    fn decode(&self, token: &str) -> Option<InternalClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Audience is checked against the resource, not a fixed value
        validation.validate_aud = false;
        // Expiry is exact; no clock leeway
        validation.leeway = 0;

        jsonwebtoken::decode::<InternalClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

#[async_trait]
impl AuthStrategy for InternalTokenStrategy {
    fn name(&self) -> &'static str {
        "internal_token"
    }

    async fn authenticate(&self, token: &str) -> BrokerResult<Option<Principal>> {
        // Not a JWT shape: let the next strategy try
        if token.split('.').count() != 3 {
            return Ok(None);
        }

        let Some(claims) = self.decode(token) else {
            return Ok(None);
        };

        Ok(Some(Principal {
            id: claims.sub,
            handle: None,
            display_name: claims.name,
            roles: claims.roles,
            provider: "local".to_owned(),
            profile: serde_json::Value::Null,
        }))
    }

    async fn validate_resource_access(&self, token: &str, resource_url: &str) -> BrokerResult<()> {
        let claims = self
            .decode(token)
            .ok_or_else(|| BrokerError::invalid_token("token is no longer valid"))?;

        // The audience claim is mandatory here: an internal token with no
        // audience is not valid for any resource.
        match claims.aud.as_deref() {
            Some(aud) if resource::matches(Some(aud), resource_url) => Ok(()),
            Some(_) => Err(BrokerError::invalid_audience(
                "token audience does not cover this resource",
            )),
            None => Err(BrokerError::invalid_audience(
                "token carries no audience claim",
            )),
        }
    }
}

/// Validates opaque access tokens issued by this broker.
pub struct BrokerTokenStrategy {
    broker: Arc<AuthorizationBroker>,
}

impl BrokerTokenStrategy {
    #[must_use]
    pub fn new(broker: Arc<AuthorizationBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl AuthStrategy for BrokerTokenStrategy {
    fn name(&self) -> &'static str {
        "broker_token"
    }

    async fn authenticate(&self, token: &str) -> BrokerResult<Option<Principal>> {
        Ok(self
            .broker
            .validate_access_token(token)
            .await?
            .map(|connection| connection.principal))
    }

    async fn validate_resource_access(&self, token: &str, resource_url: &str) -> BrokerResult<()> {
        let connection = self
            .broker
            .validate_access_token(token)
            .await?
            .ok_or_else(|| BrokerError::invalid_token("token is no longer valid"))?;

        AuthorizationBroker::validate_token_resource(&connection, resource_url)
    }
}
