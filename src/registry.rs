// ABOUTME: Dynamic client registration (RFC 7591) for public PKCE clients
// ABOUTME: Validates redirect URIs and persists client records in SQLite
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::constants::{clients, protocol};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::models::{ClientRegistrationRequest, RegisteredClient};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use url::Url;
use uuid::Uuid;

/// Out-of-band redirect target allowed for clients without a callback server.
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Registry of dynamically registered OAuth clients.
#[derive(Clone)]
pub struct ClientRegistry {
    pool: SqlitePool,
}

impl ClientRegistry {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new public client.
    ///
    /// All clients are public: `token_endpoint_auth_method` is fixed to
    /// `none`, grants to `authorization_code`, response types to `code`.
    ///
    /// # Errors
    /// Fails with `InvalidRedirectUri` on redirect validation and
    /// `RegistrationFailed` when persistence fails.
    pub async fn register(
        &self,
        request: ClientRegistrationRequest,
    ) -> BrokerResult<RegisteredClient> {
        validate_redirect_uris(&request.redirect_uris)?;

        let client = RegisteredClient {
            client_id: format!("fiscus_client_{}", Uuid::new_v4().simple()),
            redirect_uris: request.redirect_uris,
            client_name: request.client_name,
            auth_method: "none".to_owned(),
            grant_types: vec![protocol::GRANT_AUTHORIZATION_CODE.to_owned()],
            response_types: vec![protocol::RESPONSE_TYPE_CODE.to_owned()],
            scope: request.scope,
            issued_at: Utc::now(),
        };

        let redirect_uris_json = serde_json::to_string(&client.redirect_uris)
            .map_err(|e| BrokerError::internal("failed to encode redirect URIs").with_source(e))?;

        sqlx::query(
            r"
            INSERT INTO oauth_clients (client_id, redirect_uris, client_name, scope, issued_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&client.client_id)
        .bind(&redirect_uris_json)
        .bind(&client.client_name)
        .bind(&client.scope)
        .bind(client.issued_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            BrokerError::new(ErrorKind::RegistrationFailed, "failed to store client registration")
                .with_source(e)
        })?;

        tracing::info!(
            client_id = %client.client_id,
            redirect_uris = client.redirect_uris.len(),
            "registered OAuth client"
        );

        Ok(client)
    }

    /// Look up a registered client by id.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn get(&self, client_id: &str) -> BrokerResult<Option<RegisteredClient>> {
        let row = sqlx::query(
            r"
            SELECT client_id, redirect_uris, client_name, scope, issued_at
            FROM oauth_clients
            WHERE client_id = ?1
            ",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let redirect_uris_json: String = row.try_get("redirect_uris")?;
        let redirect_uris: Vec<String> = serde_json::from_str(&redirect_uris_json)
            .map_err(|e| BrokerError::storage("corrupt redirect_uris column").with_source(e))?;

        let issued_at_raw: String = row.try_get("issued_at")?;
        let issued_at = chrono::DateTime::parse_from_rfc3339(&issued_at_raw)
            .map_err(|e| BrokerError::storage("corrupt issued_at column").with_source(e))?
            .with_timezone(&Utc);

        Ok(Some(RegisteredClient {
            client_id: row.try_get("client_id")?,
            redirect_uris,
            client_name: row.try_get("client_name")?,
            auth_method: "none".to_owned(),
            grant_types: vec![protocol::GRANT_AUTHORIZATION_CODE.to_owned()],
            response_types: vec![protocol::RESPONSE_TYPE_CODE.to_owned()],
            scope: row.try_get("scope")?,
            issued_at,
        }))
    }

    /// Whether a client id is known, either registered or built-in.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn is_known(&self, client_id: &str) -> BrokerResult<bool> {
        if client_id == clients::BUILTIN_CLIENT_ID {
            return Ok(true);
        }
        Ok(self.get(client_id).await?.is_some())
    }
}

/// Validate the redirect URI list for registration.
///
/// Rules: non-empty; each URI absolute; no fragments; no wildcards; https
/// required except for localhost loopback hosts; the OOB urn is allowed.
fn validate_redirect_uris(uris: &[String]) -> BrokerResult<()> {
    if uris.is_empty() {
        return Err(BrokerError::invalid_redirect_uri(
            "at least one redirect_uri is required",
        ));
    }

    for uri in uris {
        if uri == OOB_REDIRECT_URI {
            continue;
        }

        if uri.contains('#') {
            return Err(BrokerError::invalid_redirect_uri(
                "redirect_uri must not contain a fragment",
            ));
        }

        if uri.contains('*') {
            return Err(BrokerError::invalid_redirect_uri(
                "redirect_uri must not contain wildcards",
            ));
        }

        let parsed = Url::parse(uri).map_err(|_| {
            BrokerError::invalid_redirect_uri("redirect_uri must be an absolute URI")
        })?;

        match parsed.scheme() {
            "https" => {}
            "http" => {
                let host = parsed.host_str().unwrap_or_default();
                if host != "localhost" && host != "127.0.0.1" && host != "[::1]" {
                    return Err(BrokerError::invalid_redirect_uri(
                        "http redirect_uri is only allowed for loopback hosts",
                    ));
                }
            }
            _ => {
                return Err(BrokerError::invalid_redirect_uri(
                    "redirect_uri must use https or loopback http",
                ));
            }
        }
    }

    Ok(())
}
