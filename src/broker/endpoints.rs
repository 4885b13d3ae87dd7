// ABOUTME: OAuth protocol operations: authorize, callback, approval, token, revoke
// ABOUTME: Pure broker logic returning redirect URLs and token responses; HTTP lives in routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use super::{append_query, AuthorizationBroker};
use crate::constants::{lifetimes, protocol};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::logging::log_security_event;
use crate::models::{
    AuthorizeQuery, AuthorizationCode, CallbackQuery, PendingStatus, Principal, RevokeRequest,
    TokenConnection, TokenRequest, TokenResponse, TokenSource,
};
use crate::store::pending::PendingRequestParams;
use crate::state::StatePayload;
use crate::{pkce, resource};
use chrono::{Duration, Utc};
use uuid::Uuid;

impl AuthorizationBroker {
    /// Handle GET /oauth/authorize. Returns the URL the user agent should
    /// be redirected to.
    ///
    /// With an upstream provider configured, the request context is sealed
    /// into a signed state envelope and the user agent goes to the
    /// provider. Otherwise the request enters the local approval queue and
    /// the user agent goes to the approval page.
    ///
    /// # Errors
    /// Validation failures surface as 400-class errors; the user agent is
    /// never redirected to an unvalidated URI.
    pub async fn authorize(&self, query: AuthorizeQuery) -> BrokerResult<String> {
        let response_type = query
            .response_type
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("response_type is required"))?;
        if response_type != protocol::RESPONSE_TYPE_CODE {
            return Err(BrokerError::invalid_request(
                "response_type must be 'code'",
            ));
        }

        let client_id = query
            .client_id
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("client_id is required"))?;
        let client = self.resolve_client(client_id).await?;

        let redirect_uri = query
            .redirect_uri
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("redirect_uri is required"))?;
        Self::validate_redirect(&client, redirect_uri)?;

        let code_challenge = query
            .code_challenge
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("code_challenge is required"))?;
        if code_challenge.len() < 43 || code_challenge.len() > 128 {
            return Err(BrokerError::invalid_request(
                "code_challenge must be between 43 and 128 characters",
            ));
        }

        let challenge_method = query
            .code_challenge_method
            .as_deref()
            .unwrap_or(protocol::CHALLENGE_METHOD_S256);
        pkce::ensure_supported_method(challenge_method)?;

        let scope = Self::resolve_scope(client_id, query.scope.as_deref());

        let resource_indicator = query
            .resource
            .as_deref()
            .map(resource::normalize)
            .transpose()?;

        if let Some(upstream) = &self.upstream {
            let payload = StatePayload {
                nonce: Uuid::new_v4().simple().to_string(),
                issued_at: Utc::now().timestamp(),
                client_state: query.state.clone(),
                client_id: client_id.to_owned(),
                redirect_uri: redirect_uri.to_owned(),
                code_challenge: code_challenge.to_owned(),
                code_challenge_method: challenge_method.to_owned(),
                scope: scope.clone(),
                resource: resource_indicator,
            };
            let state = self.state_codec.encode(&payload)?;

            tracing::debug!(client_id, provider = upstream.provider_name(), "redirecting to upstream provider");
            return Ok(upstream.build_authorize_url(&self.config.callback_url(), &state));
        }

        let request = self
            .pending
            .create(PendingRequestParams {
                client_id: client_id.to_owned(),
                redirect_uri: redirect_uri.to_owned(),
                scope: scope.clone(),
                client_state: query.state.clone(),
                code_challenge: code_challenge.to_owned(),
                code_challenge_method: challenge_method.to_owned(),
                resource: resource_indicator,
            })
            .await;

        tracing::debug!(client_id, request_id = %request.request_id, "queued authorization request for local approval");

        Ok(append_query(
            &self.config.approval_page_url,
            &[
                ("request_id", request.request_id.as_str()),
                ("client_id", client_id),
                ("scope", scope.as_str()),
            ],
        ))
    }

    /// Handle GET /oauth/callback from the upstream provider. Returns the
    /// URL the user agent should be redirected to.
    ///
    /// Provider errors pass through to the client's redirect URI with the
    /// original client state. A successful code exchange mints a broker
    /// authorization code bound to the provider token.
    ///
    /// # Errors
    /// State failures surface as errors (400); there is no trusted redirect
    /// target without a valid state.
    pub async fn callback(&self, query: CallbackQuery) -> BrokerResult<String> {
        let state = query.state.as_deref().ok_or_else(|| {
            BrokerError::new(ErrorKind::InvalidState, "state parameter is required")
        })?;
        let payload = self.state_codec.decode(state)?;

        // Re-check the redirect against the current registration; the
        // signature only proves we issued the state, not that the client
        // still exists.
        let client = self.resolve_client(&payload.client_id).await?;
        Self::validate_redirect(&client, &payload.redirect_uri)?;

        if let Some(error) = query.error.as_deref() {
            log_security_event("upstream_authorization_denied", &payload.client_id, false, Some(error));
            let mut params = vec![("error", error)];
            if let Some(description) = query.error_description.as_deref() {
                params.push(("error_description", description));
            }
            if let Some(client_state) = payload.client_state.as_deref() {
                params.push(("state", client_state));
            }
            return Ok(append_query(&payload.redirect_uri, &params));
        }

        let code = query.code.as_deref().ok_or_else(|| {
            BrokerError::invalid_request("callback carries neither code nor error")
        })?;

        let upstream = self.upstream.as_ref().ok_or_else(|| {
            BrokerError::internal("callback received without an upstream provider configured")
        })?;

        let callback_url = self.config.callback_url();
        let upstream_token = upstream.exchange_code(code, &callback_url).await?;
        let principal = upstream.fetch_profile(&upstream_token).await?;

        let auth_code = self
            .issue_code(
                &payload.client_id,
                &payload.redirect_uri,
                &payload.code_challenge,
                &payload.code_challenge_method,
                &payload.scope,
                upstream_token,
                TokenSource::Upstream,
                principal,
                payload.resource.clone(),
            )
            .await?;

        log_security_event("authorization_code_issued", &payload.client_id, true, Some("upstream"));

        let mut params = vec![("code", auth_code.as_str()), ("scope", payload.scope.as_str())];
        if let Some(client_state) = payload.client_state.as_deref() {
            params.push(("state", client_state));
        }
        Ok(append_query(&payload.redirect_uri, &params))
    }

    /// Approve a pending local authorization request on behalf of an
    /// authenticated principal. Returns the client redirect URL carrying a
    /// fresh authorization code.
    ///
    /// # Errors
    /// Fails with `RequestNotFound`, `RequestExpired`, or
    /// `RequestAlreadyProcessed` per the queue state, and `Storage` if the
    /// code cannot be persisted.
    pub async fn approve_request(
        &self,
        request_id: &str,
        principal: Principal,
        bearer_token: &str,
    ) -> BrokerResult<String> {
        let request = self
            .pending
            .transition(request_id, PendingStatus::Approved)
            .await?;

        let issued = self
            .issue_code(
                &request.client_id,
                &request.redirect_uri,
                &request.code_challenge,
                &request.code_challenge_method,
                &request.scope,
                bearer_token.to_owned(),
                TokenSource::Local,
                principal,
                request.resource.clone(),
            )
            .await;

        let auth_code = match issued {
            Ok(code) => code,
            Err(error) => {
                // A half-approved request must not stay approvable
                self.pending.revert_to_denied(request_id).await;
                return Err(error);
            }
        };

        log_security_event("authorization_request_approved", &request.client_id, true, None);

        let mut params = vec![("code", auth_code.as_str()), ("scope", request.scope.as_str())];
        if let Some(client_state) = request.client_state.as_deref() {
            params.push(("state", client_state));
        }
        Ok(append_query(&request.redirect_uri, &params))
    }

    /// Deny a pending local authorization request. Returns the client
    /// redirect URL carrying `error=access_denied`.
    ///
    /// # Errors
    /// Fails with `RequestNotFound`, `RequestExpired`, or
    /// `RequestAlreadyProcessed` per the queue state.
    pub async fn deny_request(&self, request_id: &str) -> BrokerResult<String> {
        let request = self
            .pending
            .transition(request_id, PendingStatus::Denied)
            .await?;

        log_security_event("authorization_request_denied", &request.client_id, false, None);

        let mut params = vec![
            ("error", "access_denied"),
            ("error_description", "the resource owner denied the request"),
        ];
        if let Some(client_state) = request.client_state.as_deref() {
            params.push(("state", client_state));
        }
        Ok(append_query(&request.redirect_uri, &params))
    }

    /// Handle POST /oauth/token: grant dispatch.
    ///
    /// # Errors
    /// Fails with `UnsupportedGrantType` for anything but the two
    /// implemented grants, and with the grant-specific kinds otherwise.
    pub async fn token(&self, request: TokenRequest) -> BrokerResult<TokenResponse> {
        match request.grant_type.as_str() {
            protocol::GRANT_AUTHORIZATION_CODE => self.exchange_authorization_code(request).await,
            protocol::GRANT_REFRESH_TOKEN => self.refresh_tokens(request).await,
            other => Err(BrokerError::new(
                ErrorKind::UnsupportedGrantType,
                format!("unsupported grant_type '{other}'"),
            )),
        }
    }

    /// Authorization-code grant: consume the code, verify PKCE, mint a pair.
    async fn exchange_authorization_code(
        &self,
        request: TokenRequest,
    ) -> BrokerResult<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("code is required"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("redirect_uri is required"))?;
        let code_verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("code_verifier is required"))?;

        // Single-use: the row is gone after this call no matter which later
        // check fails.
        let Some(grant) = self.store.consume_code(code).await? else {
            log_security_event("code_exchange_failed", &request.client_id, false, Some("unknown or reused code"));
            return Err(BrokerError::invalid_grant(
                "invalid or expired authorization code",
            ));
        };

        if grant.client_id != request.client_id || grant.redirect_uri != redirect_uri {
            log_security_event("code_exchange_failed", &request.client_id, false, Some("binding mismatch"));
            return Err(BrokerError::invalid_grant(
                "authorization code was issued to a different client or redirect_uri",
            ));
        }

        if grant.expires_at <= Utc::now() {
            return Err(BrokerError::new(
                ErrorKind::ExpiredGrant,
                "authorization code has expired",
            ));
        }

        pkce::verify(&grant.code_challenge, code_verifier)?;

        if let Some(requested) = request.resource.as_deref() {
            if !resource::matches(grant.resource.as_deref(), requested) {
                return Err(BrokerError::invalid_audience(
                    "requested resource is outside the granted audience",
                ));
            }
        }

        let connection = self
            .issue_connection(
                &grant.client_id,
                &grant.scope,
                grant.token_source,
                grant.bound_access_token,
                grant.principal,
                grant.resource,
            )
            .await?;

        log_security_event("tokens_issued", &request.client_id, true, Some("authorization_code"));

        Ok(Self::token_response(&connection))
    }

    /// Refresh-token grant: rotate the pair, re-validating upstream-backed
    /// credentials.
    async fn refresh_tokens(&self, request: TokenRequest) -> BrokerResult<TokenResponse> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| BrokerError::invalid_request("refresh_token is required"))?;

        // The client_id predicate lives inside the delete, so a stolen
        // refresh token presented by another client finds nothing and the
        // legitimate connection survives.
        let Some(old) = self
            .store
            .consume_connection_by_refresh(refresh_token, &request.client_id)
            .await?
        else {
            log_security_event("refresh_failed", &request.client_id, false, Some("unknown or rotated token"));
            return Err(BrokerError::new(
                ErrorKind::InvalidRefreshToken,
                "invalid or expired refresh token",
            ));
        };

        if old.refresh_expires_at <= Utc::now() {
            return Err(BrokerError::new(
                ErrorKind::ExpiredRefreshToken,
                "refresh token has expired",
            ));
        }

        if old.token_source == TokenSource::Upstream {
            if let Some(upstream) = &self.upstream {
                // The backing provider token must still be alive; a revoked
                // upstream grant must not be refreshable here.
                if let Err(error) = upstream.validate_token(&old.bound_access_token).await {
                    if error.kind == ErrorKind::UpstreamUnavailable {
                        // Transient outage: put the consumed connection back
                        // so the client can retry with the same token.
                        if let Err(restore) = self.store.store_connection(&old).await {
                            tracing::error!(
                                error = %restore,
                                "failed to restore connection after upstream outage"
                            );
                        }
                    }
                    return Err(error);
                }
            }
        }

        let scope = Self::narrow_scope(&old.scope, request.scope.as_deref());

        let connection = self
            .issue_connection(
                &old.client_id,
                &scope,
                old.token_source,
                old.bound_access_token,
                old.principal,
                old.resource,
            )
            .await?;

        log_security_event("tokens_issued", &request.client_id, true, Some("refresh_token"));

        Ok(Self::token_response(&connection))
    }

    /// Handle POST /oauth/revoke (RFC 7009).
    ///
    /// Always succeeds from the caller's perspective: whether the token
    /// existed is never revealed.
    ///
    /// # Errors
    /// Fails only with `Storage` on database errors.
    pub async fn revoke(&self, request: RevokeRequest) -> BrokerResult<()> {
        let hint = request.token_type_hint.as_deref();

        let removed = if hint == Some("access_token") {
            self.store
                .delete_by_access(&request.token, &request.client_id)
                .await?
                || self
                    .store
                    .delete_by_refresh(&request.token, &request.client_id)
                    .await?
        } else {
            let mut removed = self
                .store
                .delete_by_refresh(&request.token, &request.client_id)
                .await?;
            // A refresh_token hint is taken at its word: no fallback to the
            // access-token column.
            if !removed && hint != Some("refresh_token") {
                removed = self
                    .store
                    .delete_by_access(&request.token, &request.client_id)
                    .await?;
            }
            removed
        };

        if removed {
            log_security_event("token_revoked", &request.client_id, true, hint);
        }

        Ok(())
    }

    /// Validate a broker access token. Expired or unknown tokens yield
    /// `None`; expired rows are purged as they are seen.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn validate_access_token(
        &self,
        access_token: &str,
    ) -> BrokerResult<Option<TokenConnection>> {
        let Some(connection) = self
            .store
            .get_connection_by_access_token(access_token)
            .await?
        else {
            return Ok(None);
        };

        if connection.expires_at <= Utc::now() {
            // Best effort; the sweeper catches anything this misses
            if let Err(e) = self.store.purge_by_access(access_token).await {
                tracing::debug!(error = %e, "failed to purge expired connection");
            }
            return Ok(None);
        }

        Ok(Some(connection))
    }

    /// Check a validated connection against the resource it is being used
    /// for.
    ///
    /// # Errors
    /// Fails with `InvalidAudience` when the connection is bound to a
    /// different audience.
    pub fn validate_token_resource(
        connection: &TokenConnection,
        requested_resource: &str,
    ) -> BrokerResult<()> {
        if resource::matches(connection.resource.as_deref(), requested_resource) {
            Ok(())
        } else {
            Err(BrokerError::invalid_audience(
                "token is not valid for the requested resource",
            ))
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn issue_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        code_challenge: &str,
        code_challenge_method: &str,
        scope: &str,
        bound_access_token: String,
        token_source: TokenSource,
        principal: Principal,
        resource: Option<String>,
    ) -> BrokerResult<String> {
        let code = AuthorizationCode {
            code: self.generate_token()?,
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            code_challenge: code_challenge.to_owned(),
            code_challenge_method: code_challenge_method.to_owned(),
            scope: scope.to_owned(),
            bound_access_token,
            token_source,
            principal,
            resource,
            expires_at: Utc::now() + Duration::minutes(lifetimes::AUTH_CODE_MINUTES),
        };

        self.store.store_code(&code).await?;
        Ok(code.code)
    }

    async fn issue_connection(
        &self,
        client_id: &str,
        scope: &str,
        token_source: TokenSource,
        bound_access_token: String,
        principal: Principal,
        resource: Option<String>,
    ) -> BrokerResult<TokenConnection> {
        let now = Utc::now();
        let connection = TokenConnection {
            access_token: self.generate_token()?,
            refresh_token: self.generate_token()?,
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            token_source,
            bound_access_token,
            principal,
            resource,
            expires_at: now + Duration::seconds(lifetimes::ACCESS_TOKEN_SECS),
            refresh_expires_at: now + Duration::days(lifetimes::REFRESH_TOKEN_DAYS),
            created_at: now,
        };

        self.store.store_connection(&connection).await?;
        Ok(connection)
    }

    fn token_response(connection: &TokenConnection) -> TokenResponse {
        TokenResponse {
            access_token: connection.access_token.clone(),
            token_type: protocol::TOKEN_TYPE_BEARER.to_owned(),
            scope: connection.scope.clone(),
            expires_in: lifetimes::ACCESS_TOKEN_SECS,
            refresh_token: connection.refresh_token.clone(),
            user: (&connection.principal).into(),
        }
    }
}
