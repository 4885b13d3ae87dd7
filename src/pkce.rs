// ABOUTME: PKCE challenge derivation and verification (RFC 7636)
// ABOUTME: S256 only, constant-time comparison of derived challenges
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::constants::protocol::CHALLENGE_METHOD_S256;
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Reject any challenge method other than `S256`.
///
/// The `plain` method is not supported: it defeats the purpose of PKCE when
/// the authorization response can be observed.
///
/// # Errors
/// Fails with `UnsupportedChallengeMethod` for anything but `S256`.
pub fn ensure_supported_method(method: &str) -> BrokerResult<()> {
    if method == CHALLENGE_METHOD_S256 {
        Ok(())
    } else {
        Err(BrokerError::new(
            ErrorKind::UnsupportedChallengeMethod,
            "code_challenge_method must be 'S256'",
        ))
    }
}

/// Validate verifier format per RFC 7636 §4.1: 43–128 characters from the
/// unreserved set.
///
/// # Errors
/// Fails with `InvalidCodeVerifier` on length or charset violations.
pub fn validate_verifier_format(verifier: &str) -> BrokerResult<()> {
    if verifier.len() < 43 || verifier.len() > 128 {
        return Err(BrokerError::new(
            ErrorKind::InvalidCodeVerifier,
            "code_verifier must be between 43 and 128 characters",
        ));
    }

    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(BrokerError::new(
            ErrorKind::InvalidCodeVerifier,
            "code_verifier contains characters outside the unreserved set",
        ));
    }

    Ok(())
}

/// Derive the S256 challenge for a verifier: `base64url(SHA-256(verifier))`.
///
/// # Errors
/// Fails with `InvalidCodeVerifier` if the verifier format is invalid.
pub fn derive_challenge(verifier: &str) -> BrokerResult<String> {
    validate_verifier_format(verifier)?;

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let hash = hasher.finalize();
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(hash))
}

/// Verify a presented verifier against a stored challenge in constant time.
///
/// # Errors
/// Fails with `InvalidCodeVerifier` on format violation or mismatch.
pub fn verify(challenge: &str, verifier: &str) -> BrokerResult<()> {
    let derived = derive_challenge(verifier)?;

    if derived.as_bytes().ct_eq(challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(BrokerError::new(
            ErrorKind::InvalidCodeVerifier,
            "code_verifier does not match code_challenge",
        ))
    }
}
