// ABOUTME: HTTP client for the optional upstream identity provider
// ABOUTME: Authorize-URL construction, code exchange, profile fetch, and token re-validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::config::UpstreamIdpConfig;
use crate::errors::{BrokerError, BrokerResult};
use crate::models::Principal;
use serde::Deserialize;

/// Token response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
struct UpstreamTokenResponse {
    access_token: String,
}

/// Client for the configured upstream identity provider.
pub struct UpstreamProvider {
    config: UpstreamIdpConfig,
    client: reqwest::Client,
}

impl UpstreamProvider {
    /// Build a provider client with the configured request timeout.
    ///
    /// # Errors
    /// Fails with `Internal` if the HTTP client cannot be constructed.
    pub fn new(config: UpstreamIdpConfig) -> BrokerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BrokerError::internal("failed to build upstream HTTP client").with_source(e))?;

        Ok(Self { config, client })
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    /// Authorization URL the user agent is redirected to, carrying our
    /// signed state.
    #[must_use]
    pub fn build_authorize_url(&self, callback_url: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(callback_url),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a provider access token.
    ///
    /// # Errors
    /// Fails with `InvalidGrant` when the provider rejects the code and
    /// `UpstreamUnavailable` on network failures or provider 5xx.
    pub async fn exchange_code(&self, code: &str, callback_url: &str) -> BrokerResult<String> {
        let response = self
            .client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", callback_url),
            ])
            .send()
            .await
            .map_err(|e| {
                BrokerError::upstream_unavailable("identity provider did not respond")
                    .with_source(e)
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(BrokerError::invalid_grant(
                "identity provider rejected the authorization code",
            ));
        }
        if !status.is_success() {
            return Err(BrokerError::upstream_unavailable(format!(
                "identity provider token endpoint returned {status}"
            )));
        }

        let body: UpstreamTokenResponse = response.json().await.map_err(|e| {
            BrokerError::upstream_unavailable("identity provider returned an unreadable token response")
                .with_source(e)
        })?;

        Ok(body.access_token)
    }

    /// Fetch the profile behind a provider access token and map it to a
    /// principal.
    ///
    /// # Errors
    /// Fails with `InvalidGrant` when the provider rejects the token and
    /// `UpstreamUnavailable` on network failures or provider 5xx.
    pub async fn fetch_profile(&self, upstream_token: &str) -> BrokerResult<Principal> {
        let response = self
            .client
            .get(&self.config.profile_url)
            .header("Accept", "application/json")
            .bearer_auth(upstream_token)
            .send()
            .await
            .map_err(|e| {
                BrokerError::upstream_unavailable("identity provider did not respond")
                    .with_source(e)
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(BrokerError::invalid_grant(
                "identity provider rejected the access token",
            ));
        }
        if !status.is_success() {
            return Err(BrokerError::upstream_unavailable(format!(
                "identity provider profile endpoint returned {status}"
            )));
        }

        let profile: serde_json::Value = response.json().await.map_err(|e| {
            BrokerError::upstream_unavailable("identity provider returned an unreadable profile")
                .with_source(e)
        })?;

        Ok(principal_from_profile(&profile, &self.config.provider_name))
    }

    /// Re-validate a previously issued provider token by fetching the
    /// profile it protects.
    ///
    /// # Errors
    /// Same mapping as `fetch_profile`: rejected token surfaces as
    /// `InvalidGrant`, provider trouble as `UpstreamUnavailable`.
    pub async fn validate_token(&self, upstream_token: &str) -> BrokerResult<()> {
        self.fetch_profile(upstream_token).await.map(|_| ())
    }
}

/// Map a provider profile document onto a principal.
///
/// Field names cover the common providers: `id`/`sub` for the subject,
/// `login`/`preferred_username` for the handle, `name` for display.
fn principal_from_profile(profile: &serde_json::Value, provider: &str) -> Principal {
    let id = profile
        .get("id")
        .map(value_to_string)
        .or_else(|| profile.get("sub").map(value_to_string))
        .unwrap_or_else(|| "unknown".to_owned());

    let handle = profile
        .get("login")
        .or_else(|| profile.get("preferred_username"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    let display_name = profile
        .get("name")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    Principal {
        id,
        handle,
        display_name,
        roles: Vec::new(),
        provider: provider.to_owned(),
        profile: profile.clone(),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamIdpConfig;
    use std::time::Duration;

    fn config() -> UpstreamIdpConfig {
        UpstreamIdpConfig {
            provider_name: "github".into(),
            client_id: "broker-id".into(),
            client_secret: "broker-secret".into(),
            authorize_url: "https://idp.example/login/oauth/authorize".into(),
            token_url: "https://idp.example/login/oauth/access_token".into(),
            profile_url: "https://idp.example/user".into(),
            scope: "read:user".into(),
            request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_authorize_url_encodes_parameters() {
        let provider = UpstreamProvider::new(config()).unwrap();
        let url = provider.build_authorize_url("https://broker.example/oauth/callback", "st.sig");

        assert!(url.starts_with("https://idp.example/login/oauth/authorize?"));
        assert!(url.contains("client_id=broker-id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fbroker.example%2Foauth%2Fcallback"));
        assert!(url.contains("scope=read%3Auser"));
        assert!(url.contains("state=st.sig"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn test_principal_from_github_style_profile() {
        let profile = serde_json::json!({
            "id": 12345,
            "login": "octocat",
            "name": "Octo Cat"
        });

        let principal = principal_from_profile(&profile, "github");
        assert_eq!(principal.id, "12345");
        assert_eq!(principal.handle.as_deref(), Some("octocat"));
        assert_eq!(principal.display_name.as_deref(), Some("Octo Cat"));
        assert_eq!(principal.provider, "github");
    }

    #[test]
    fn test_principal_from_oidc_style_profile() {
        let profile = serde_json::json!({
            "sub": "user-789",
            "preferred_username": "jdoe",
            "name": "J. Doe"
        });

        let principal = principal_from_profile(&profile, "oidc");
        assert_eq!(principal.id, "user-789");
        assert_eq!(principal.handle.as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_principal_from_sparse_profile() {
        let profile = serde_json::json!({});
        let principal = principal_from_profile(&profile, "oidc");
        assert_eq!(principal.id, "unknown");
        assert!(principal.handle.is_none());
    }
}
