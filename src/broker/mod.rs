// ABOUTME: Authorization broker core: shared state, validation helpers, token minting
// ABOUTME: Protocol operations (authorize, callback, token, revoke) live in endpoints.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::config::ServerConfig;
use crate::constants::{clients, scopes};
use crate::errors::{BrokerError, BrokerResult};
use crate::models::RegisteredClient;
use crate::registry::ClientRegistry;
use crate::state::StateCodec;
use crate::store::pending::PendingRequestStore;
use crate::store::TokenStore;
use crate::upstream::UpstreamProvider;
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

mod endpoints;

/// The authorization broker.
///
/// Owns every collaborator the OAuth endpoints need: the client registry,
/// the grant store, the pending-approval queue, the signed-state codec, and
/// the optional upstream identity provider.
pub struct AuthorizationBroker {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) registry: ClientRegistry,
    pub(crate) store: TokenStore,
    pub(crate) pending: PendingRequestStore,
    pub(crate) state_codec: StateCodec,
    pub(crate) upstream: Option<UpstreamProvider>,
    rng: SystemRandom,
}

impl AuthorizationBroker {
    /// Assemble the broker from its collaborators.
    ///
    /// # Errors
    /// Fails with `Internal` if the upstream HTTP client cannot be built.
    pub fn new(
        config: Arc<ServerConfig>,
        registry: ClientRegistry,
        store: TokenStore,
        pending: PendingRequestStore,
    ) -> BrokerResult<Self> {
        let state_codec = StateCodec::new(&config.state_secret);
        let upstream = config
            .upstream
            .clone()
            .map(UpstreamProvider::new)
            .transpose()?;

        Ok(Self {
            config,
            registry,
            store,
            pending,
            state_codec,
            upstream,
            rng: SystemRandom::new(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Mint an opaque token: 32 bytes of CSPRNG output, base64url encoded.
    ///
    /// # Errors
    /// Fails with `Internal` if the system RNG fails.
    pub(crate) fn generate_token(&self) -> BrokerResult<String> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| BrokerError::internal("system RNG failure"))?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Resolve the effective client for an authorization request.
    ///
    /// The built-in first-party client needs no registry row; its single
    /// redirect URI comes from configuration.
    ///
    /// # Errors
    /// Fails with `InvalidClient` for unknown clients and `Storage` on
    /// database errors.
    pub(crate) async fn resolve_client(&self, client_id: &str) -> BrokerResult<RegisteredClient> {
        if client_id == clients::BUILTIN_CLIENT_ID {
            return Ok(builtin_client(&self.config));
        }

        self.registry
            .get(client_id)
            .await?
            .ok_or_else(|| BrokerError::invalid_client("unknown client_id"))
    }

    /// Validate that a redirect URI is one the client registered.
    ///
    /// Exact string match against the registered list; no prefix or
    /// wildcard matching.
    ///
    /// # Errors
    /// Fails with `InvalidRedirectUri` on mismatch.
    pub(crate) fn validate_redirect(
        client: &RegisteredClient,
        redirect_uri: &str,
    ) -> BrokerResult<()> {
        if client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            Ok(())
        } else {
            Err(BrokerError::invalid_redirect_uri(
                "redirect_uri is not registered for this client",
            ))
        }
    }

    /// Resolve the scope grant for a request.
    ///
    /// Requested scopes are filtered against the allow-list; anything
    /// unknown is dropped with a log line. An empty or absent request
    /// degrades to the default grant.
    pub(crate) fn resolve_scope(client_id: &str, requested: Option<&str>) -> String {
        let Some(requested) = requested.filter(|s| !s.trim().is_empty()) else {
            return scopes::DEFAULT.to_owned();
        };

        let granted: Vec<&str> = requested
            .split_whitespace()
            .filter(|scope| scopes::SUPPORTED.contains(scope))
            .collect();

        if granted.is_empty() {
            tracing::info!(
                client_id,
                requested,
                "no requested scope is supported, granting default scope"
            );
            return scopes::DEFAULT.to_owned();
        }

        if granted.len() < requested.split_whitespace().count() {
            tracing::info!(client_id, requested, "dropped unsupported scopes from grant");
        }

        granted.join(" ")
    }

    /// Intersect a refresh-time scope request with the originally granted
    /// scope. Absent request keeps the original grant unchanged.
    pub(crate) fn narrow_scope(original: &str, requested: Option<&str>) -> String {
        let Some(requested) = requested.filter(|s| !s.trim().is_empty()) else {
            return original.to_owned();
        };

        let original_scopes: Vec<&str> = original.split_whitespace().collect();
        let narrowed: Vec<&str> = requested
            .split_whitespace()
            .filter(|scope| original_scopes.contains(scope))
            .collect();

        if narrowed.is_empty() {
            original.to_owned()
        } else {
            narrowed.join(" ")
        }
    }
}

/// Synthesized registry entry for the built-in first-party client.
fn builtin_client(config: &ServerConfig) -> RegisteredClient {
    RegisteredClient {
        client_id: clients::BUILTIN_CLIENT_ID.to_owned(),
        redirect_uris: vec![config.builtin_redirect_uri.clone()],
        client_name: Some("Fiscus Web".to_owned()),
        auth_method: "none".to_owned(),
        grant_types: vec![crate::constants::protocol::GRANT_AUTHORIZATION_CODE.to_owned()],
        response_types: vec![crate::constants::protocol::RESPONSE_TYPE_CODE.to_owned()],
        scope: None,
        issued_at: chrono::Utc::now(),
    }
}

/// Append query parameters to a redirect URI, preserving any it already has.
pub(crate) fn append_query(redirect_uri: &str, params: &[(&str, &str)]) -> String {
    let mut url = redirect_uri.to_owned();
    for (key, value) in params {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}
