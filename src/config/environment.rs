// ABOUTME: Environment-based server configuration for the authorization broker
// ABOUTME: Reads bind address, issuer, secrets, lifetimes, and the optional upstream IdP block
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::constants::lifetimes;
use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::env;
use std::time::Duration;

/// Top-level server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// HTTP port
    pub http_port: u16,
    /// External issuer URL (scheme + host, no trailing slash), used in
    /// metadata documents and redirect construction
    pub issuer_url: String,
    /// Local approval page the authorize endpoint redirects to when no
    /// upstream IdP is configured
    pub approval_page_url: String,
    /// Redirect URI registered for the built-in first-party client
    pub builtin_redirect_uri: String,
    /// SQLite database URL
    pub database_url: String,
    /// HMAC key for the signed-state codec
    pub state_secret: Vec<u8>,
    /// HMAC key for internally issued signed tokens
    pub internal_token_secret: Vec<u8>,
    /// Interval between background expiry sweeps
    pub sweep_interval: Duration,
    /// Optional upstream identity provider; absent means local approval flow
    pub upstream: Option<UpstreamIdpConfig>,
}

/// Upstream identity-provider federation settings.
#[derive(Debug, Clone)]
pub struct UpstreamIdpConfig {
    /// Provider label recorded on principals (e.g. "github")
    pub provider_name: String,
    /// Client id issued to this broker by the provider
    pub client_id: String,
    /// Client secret issued to this broker by the provider
    pub client_secret: String,
    /// Provider authorize endpoint
    pub authorize_url: String,
    /// Provider token endpoint
    pub token_url: String,
    /// Provider profile (userinfo) endpoint, also used for token introspection
    pub profile_url: String,
    /// Scopes requested from the provider
    pub scope: String,
    /// Bound timeout applied to every provider call
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self> {
        let host = env_or("HOST", "127.0.0.1");
        let http_port = env_or("HTTP_PORT", "8081")
            .parse::<u16>()
            .context("HTTP_PORT must be a valid port number")?;

        let issuer_url = env::var("ISSUER_URL")
            .unwrap_or_else(|_| format!("http://{host}:{http_port}"))
            .trim_end_matches('/')
            .to_owned();

        let approval_page_url =
            env::var("APPROVAL_PAGE_URL").unwrap_or_else(|_| format!("{issuer_url}/authorize"));

        let builtin_redirect_uri = env::var("BUILTIN_REDIRECT_URI")
            .unwrap_or_else(|_| format!("{issuer_url}/auth/callback"));

        let database_url = env_or("DATABASE_URL", "sqlite:fiscus_auth.db");

        let state_secret = required_secret("STATE_SECRET")?;
        let internal_token_secret = required_secret("INTERNAL_TOKEN_SECRET")?;

        let sweep_interval = Duration::from_secs(
            env_or("SWEEP_INTERVAL_SECS", &lifetimes::SWEEP_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .context("SWEEP_INTERVAL_SECS must be an integer")?,
        );

        Ok(Self {
            host,
            http_port,
            issuer_url,
            approval_page_url,
            builtin_redirect_uri,
            database_url,
            state_secret,
            internal_token_secret,
            sweep_interval,
            upstream: UpstreamIdpConfig::from_env()?,
        })
    }

    /// URL of the protected-resource metadata document, used as the
    /// `WWW-Authenticate` realm on 401 responses.
    #[must_use]
    pub fn protected_resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.issuer_url)
    }

    /// Callback URL this broker registers with the upstream provider.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/oauth/callback", self.issuer_url)
    }
}

impl UpstreamIdpConfig {
    /// Read the optional `UPSTREAM_*` block.
    ///
    /// The block is considered present when `UPSTREAM_CLIENT_ID` is set; all
    /// other endpoint variables are then required.
    ///
    /// # Errors
    /// Returns an error if the block is partially configured.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(client_id) = env::var("UPSTREAM_CLIENT_ID") else {
            return Ok(None);
        };

        let require = |key: &str| -> Result<String> {
            env::var(key).with_context(|| format!("{key} is required when UPSTREAM_CLIENT_ID is set"))
        };

        let request_timeout = Duration::from_secs(
            env_or("UPSTREAM_TIMEOUT_SECS", "10")
                .parse::<u64>()
                .context("UPSTREAM_TIMEOUT_SECS must be an integer")?,
        );

        Ok(Some(Self {
            provider_name: env_or("UPSTREAM_PROVIDER_NAME", "upstream"),
            client_id,
            client_secret: require("UPSTREAM_CLIENT_SECRET")?,
            authorize_url: require("UPSTREAM_AUTHORIZE_URL")?,
            token_url: require("UPSTREAM_TOKEN_URL")?,
            profile_url: require("UPSTREAM_PROFILE_URL")?,
            scope: env_or("UPSTREAM_SCOPE", "openid profile"),
            request_timeout,
        }))
    }
}

/// Read an environment variable with a default.
fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Decode a required base64-encoded secret key.
fn required_secret(key: &str) -> Result<Vec<u8>> {
    let encoded = env::var(key).with_context(|| format!("{key} must be set (base64-encoded)"))?;
    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .with_context(|| format!("{key} must be valid base64"))?;
    anyhow::ensure!(decoded.len() >= 32, "{key} must decode to at least 32 bytes");
    Ok(decoded)
}
