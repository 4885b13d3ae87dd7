// ABOUTME: Protocol constants shared across the authorization broker
// ABOUTME: Token lifetimes, supported scopes, and well-known client identifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

/// Canonical token and request lifetimes.
///
/// One set of lifetimes is used for both issuance and the metadata documents
/// so the advertised values never drift from the enforced ones.
pub mod lifetimes {
    /// Access-token lifetime in seconds (1 hour)
    pub const ACCESS_TOKEN_SECS: i64 = 3600;
    /// Refresh-token lifetime in days (rotated on every use)
    pub const REFRESH_TOKEN_DAYS: i64 = 7;
    /// Authorization-code lifetime in minutes (single use)
    pub const AUTH_CODE_MINUTES: i64 = 5;
    /// Signed-state validity in seconds (one redirect round-trip)
    pub const SIGNED_STATE_SECS: i64 = 300;
    /// Pending approval request TTL in minutes
    pub const PENDING_REQUEST_MINUTES: i64 = 10;
    /// Interval between best-effort expiry sweeps in seconds
    pub const SWEEP_INTERVAL_SECS: u64 = 300;
}

/// Scope allow-list and defaults.
pub mod scopes {
    /// Scopes a client may be granted
    pub const SUPPORTED: &[&str] = &[
        "profile",
        "accounts:read",
        "transactions:read",
        "transactions:write",
    ];

    /// Default grant when the request carries no usable scope
    pub const DEFAULT: &str = "profile accounts:read transactions:read";
}

/// Well-known client identifiers.
pub mod clients {
    /// First-party web client; passes validation without a registry row
    pub const BUILTIN_CLIENT_ID: &str = "fiscus-web";
}

/// Token classification values persisted with codes and connections.
pub mod token_sources {
    /// Token pair backed by an upstream identity-provider token
    pub const UPSTREAM: &str = "upstream";
    /// Token pair issued from a local passkey-authenticated approval
    pub const LOCAL: &str = "local";
}

/// OAuth protocol literals.
pub mod protocol {
    /// Only supported response type
    pub const RESPONSE_TYPE_CODE: &str = "code";
    /// Only supported PKCE challenge method
    pub const CHALLENGE_METHOD_S256: &str = "S256";
    /// Bearer token type returned by the token endpoint
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
    /// Grant types the broker implements
    pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
    pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
}
