// ABOUTME: SQLite-backed persistence for authorization codes and token connections
// ABOUTME: Single-use consumption via DELETE ... RETURNING, plus background expiry sweeps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::errors::{BrokerError, BrokerResult};
use crate::models::{AuthorizationCode, Principal, TokenConnection, TokenSource};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

pub mod pending;

/// Persistent store for codes and token connections.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist.
    ///
    /// # Errors
    /// Fails with `Storage` if schema creation fails.
    pub async fn migrate(&self) -> BrokerResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_clients (
                client_id TEXT PRIMARY KEY,
                redirect_uris TEXT NOT NULL,
                client_name TEXT,
                scope TEXT,
                issued_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS auth_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                code_challenge TEXT NOT NULL,
                code_challenge_method TEXT NOT NULL,
                scope TEXT NOT NULL,
                bound_access_token TEXT NOT NULL,
                token_source TEXT NOT NULL,
                principal TEXT NOT NULL,
                resource TEXT,
                expires_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS token_connections (
                access_token TEXT PRIMARY KEY,
                refresh_token TEXT NOT NULL UNIQUE,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                token_source TEXT NOT NULL,
                bound_access_token TEXT NOT NULL,
                principal TEXT NOT NULL,
                resource TEXT,
                expires_at TEXT NOT NULL,
                refresh_expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_auth_codes_expires ON auth_codes(expires_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_connections_refresh_expires
             ON token_connections(refresh_expires_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a freshly issued authorization code.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn store_code(&self, code: &AuthorizationCode) -> BrokerResult<()> {
        let principal_json = encode_principal(&code.principal)?;

        sqlx::query(
            r"
            INSERT INTO auth_codes (
                code, client_id, redirect_uri, code_challenge, code_challenge_method,
                scope, bound_access_token, token_source, principal, resource, expires_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.scope)
        .bind(&code.bound_access_token)
        .bind(code.token_source.as_str())
        .bind(&principal_json)
        .bind(&code.resource)
        .bind(code.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically consume an authorization code.
    ///
    /// The row is deleted and returned in a single statement, so a code can
    /// be redeemed at most once even under concurrent requests.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn consume_code(&self, code: &str) -> BrokerResult<Option<AuthorizationCode>> {
        let row = sqlx::query(
            r"
            DELETE FROM auth_codes
            WHERE code = ?1
            RETURNING code, client_id, redirect_uri, code_challenge, code_challenge_method,
                      scope, bound_access_token, token_source, principal, resource, expires_at
            ",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| code_from_row(&r)).transpose()
    }

    /// Persist a token connection.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn store_connection(&self, connection: &TokenConnection) -> BrokerResult<()> {
        let principal_json = encode_principal(&connection.principal)?;

        sqlx::query(
            r"
            INSERT INTO token_connections (
                access_token, refresh_token, client_id, scope, token_source,
                bound_access_token, principal, resource, expires_at, refresh_expires_at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(&connection.client_id)
        .bind(&connection.scope)
        .bind(connection.token_source.as_str())
        .bind(&connection.bound_access_token)
        .bind(&principal_json)
        .bind(&connection.resource)
        .bind(connection.expires_at.to_rfc3339())
        .bind(connection.refresh_expires_at.to_rfc3339())
        .bind(connection.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a connection by access token.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn get_connection_by_access_token(
        &self,
        access_token: &str,
    ) -> BrokerResult<Option<TokenConnection>> {
        let row = sqlx::query(
            r"
            SELECT access_token, refresh_token, client_id, scope, token_source,
                   bound_access_token, principal, resource, expires_at, refresh_expires_at,
                   created_at
            FROM token_connections
            WHERE access_token = ?1
            ",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| connection_from_row(&r)).transpose()
    }

    /// Atomically consume a connection by refresh token, bound to its client.
    ///
    /// The client_id predicate is part of the delete: a refresh token
    /// presented by the wrong client neither matches nor destroys the
    /// legitimate connection.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn consume_connection_by_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> BrokerResult<Option<TokenConnection>> {
        let row = sqlx::query(
            r"
            DELETE FROM token_connections
            WHERE refresh_token = ?1 AND client_id = ?2
            RETURNING access_token, refresh_token, client_id, scope, token_source,
                      bound_access_token, principal, resource, expires_at, refresh_expires_at,
                      created_at
            ",
        )
        .bind(refresh_token)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| connection_from_row(&r)).transpose()
    }

    /// Delete a connection by refresh-token value. Returns whether a row
    /// existed.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn delete_by_refresh(&self, refresh_token: &str, client_id: &str) -> BrokerResult<bool> {
        let result = sqlx::query(
            "DELETE FROM token_connections WHERE refresh_token = ?1 AND client_id = ?2",
        )
        .bind(refresh_token)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a connection by access-token value. Returns whether a row
    /// existed.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn delete_by_access(&self, access_token: &str, client_id: &str) -> BrokerResult<bool> {
        let result = sqlx::query(
            "DELETE FROM token_connections WHERE access_token = ?1 AND client_id = ?2",
        )
        .bind(access_token)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a connection by its access token regardless of client, used
    /// when a validation pass finds the row expired.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn purge_by_access(&self, access_token: &str) -> BrokerResult<()> {
        sqlx::query("DELETE FROM token_connections WHERE access_token = ?1")
            .bind(access_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove expired codes and fully expired connections.
    ///
    /// A connection stays until its refresh token expires; an expired access
    /// token alone is still refreshable.
    ///
    /// # Errors
    /// Fails with `Storage` on database errors.
    pub async fn sweep_expired(&self) -> BrokerResult<u64> {
        let now = Utc::now().to_rfc3339();

        let codes = sqlx::query("DELETE FROM auth_codes WHERE expires_at < ?1")
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let connections =
            sqlx::query("DELETE FROM token_connections WHERE refresh_expires_at < ?1")
                .bind(&now)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(codes + connections)
    }

    /// Spawn the background expiry sweeper.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.sweep_expired().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::debug!(removed, "swept expired grants");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "expiry sweep failed");
                    }
                }
            }
        })
    }
}

fn encode_principal(principal: &Principal) -> BrokerResult<String> {
    serde_json::to_string(principal)
        .map_err(|e| BrokerError::internal("failed to encode principal").with_source(e))
}

fn decode_principal(json: &str) -> BrokerResult<Principal> {
    serde_json::from_str(json)
        .map_err(|e| BrokerError::storage("corrupt principal column").with_source(e))
}

fn parse_timestamp(raw: &str, column: &str) -> BrokerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BrokerError::storage(format!("corrupt {column} column")).with_source(e))
}

fn code_from_row(row: &SqliteRow) -> BrokerResult<AuthorizationCode> {
    let token_source: String = row.try_get("token_source")?;
    let principal_json: String = row.try_get("principal")?;
    let expires_at_raw: String = row.try_get("expires_at")?;

    Ok(AuthorizationCode {
        code: row.try_get("code")?,
        client_id: row.try_get("client_id")?,
        redirect_uri: row.try_get("redirect_uri")?,
        code_challenge: row.try_get("code_challenge")?,
        code_challenge_method: row.try_get("code_challenge_method")?,
        scope: row.try_get("scope")?,
        bound_access_token: row.try_get("bound_access_token")?,
        token_source: TokenSource::from_str_or_local(&token_source),
        principal: decode_principal(&principal_json)?,
        resource: row.try_get("resource")?,
        expires_at: parse_timestamp(&expires_at_raw, "expires_at")?,
    })
}

fn connection_from_row(row: &SqliteRow) -> BrokerResult<TokenConnection> {
    let token_source: String = row.try_get("token_source")?;
    let principal_json: String = row.try_get("principal")?;
    let expires_at_raw: String = row.try_get("expires_at")?;
    let refresh_expires_at_raw: String = row.try_get("refresh_expires_at")?;
    let created_at_raw: String = row.try_get("created_at")?;

    Ok(TokenConnection {
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        client_id: row.try_get("client_id")?,
        scope: row.try_get("scope")?,
        token_source: TokenSource::from_str_or_local(&token_source),
        bound_access_token: row.try_get("bound_access_token")?,
        principal: decode_principal(&principal_json)?,
        resource: row.try_get("resource")?,
        expires_at: parse_timestamp(&expires_at_raw, "expires_at")?,
        refresh_expires_at: parse_timestamp(&refresh_expires_at_raw, "refresh_expires_at")?,
        created_at: parse_timestamp(&created_at_raw, "created_at")?,
    })
}
