// ABOUTME: Signed-state codec carrying authorization context across the IdP redirect
// ABOUTME: HMAC-SHA256 over a base64url JSON payload, 5-minute validity, no server-side session
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::constants::lifetimes::SIGNED_STATE_SECS;
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use ring::hmac;
use serde::{Deserialize, Serialize};

/// Authorization context preserved across the upstream redirect round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatePayload {
    /// Random nonce; makes every envelope unique
    pub nonce: String,
    /// Unix timestamp of issuance
    pub issued_at: i64,
    /// Opaque state supplied by the client, echoed back on completion
    pub client_state: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Signs and verifies opaque state envelopes with a server secret.
///
/// Construct once at startup with the configured key; there is no lazy key
/// initialization.
pub struct StateCodec {
    key: hmac::Key,
}

impl StateCodec {
    /// Create a codec from the server state secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Encode and sign a payload: `base64url(json).base64url(hmac)`.
    ///
    /// # Errors
    /// Fails with `Internal` if the payload cannot be serialized.
    pub fn encode(&self, payload: &StatePayload) -> BrokerResult<String> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| BrokerError::internal("failed to serialize state payload").with_source(e))?;
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(json);

        let tag = hmac::sign(&self.key, encoded.as_bytes());
        let signature = general_purpose::URL_SAFE_NO_PAD.encode(tag.as_ref());

        Ok(format!("{encoded}.{signature}"))
    }

    /// Verify and decode an envelope.
    ///
    /// # Errors
    /// Fails with `InvalidState` on malformed structure, bad signature, or
    /// undecodable payload; `ExpiredState` when older than five minutes.
    pub fn decode(&self, token: &str) -> BrokerResult<StatePayload> {
        let Some((encoded, signature)) = token.rsplit_once('.') else {
            return Err(BrokerError::new(
                ErrorKind::InvalidState,
                "state parameter is malformed",
            ));
        };

        let signature_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| BrokerError::new(ErrorKind::InvalidState, "state signature is malformed"))?;

        // ring::hmac::verify is constant-time over the tag comparison
        hmac::verify(&self.key, encoded.as_bytes(), &signature_bytes)
            .map_err(|_| BrokerError::new(ErrorKind::InvalidState, "state signature mismatch"))?;

        let json = general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| BrokerError::new(ErrorKind::InvalidState, "state payload is malformed"))?;

        let payload: StatePayload = serde_json::from_slice(&json)
            .map_err(|_| BrokerError::new(ErrorKind::InvalidState, "state payload is incomplete"))?;

        let age = Utc::now().timestamp() - payload.issued_at;
        if age > SIGNED_STATE_SECS {
            return Err(BrokerError::new(
                ErrorKind::ExpiredState,
                "state parameter has expired",
            ));
        }

        Ok(payload)
    }
}
