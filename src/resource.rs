// ABOUTME: Resource-indicator normalization and audience matching (RFC 8707)
// ABOUTME: Canonical scheme+host+path form with `/*` suffix wildcard support
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::errors::{BrokerError, BrokerResult};
use url::Url;

/// Normalize a resource indicator to its canonical form.
///
/// Canonical form is `scheme://host[:port]/path` with the default port
/// elided, no trailing slash, and query/fragment dropped. A trailing `/*`
/// wildcard segment is preserved.
///
/// # Errors
/// Fails with `InvalidRequest` if the value is not an absolute URL.
pub fn normalize(resource: &str) -> BrokerResult<String> {
    let wildcard = resource.ends_with("/*");
    let base = if wildcard {
        resource.trim_end_matches("/*")
    } else {
        resource
    };

    let url = Url::parse(base)
        .map_err(|_| BrokerError::invalid_request("resource must be an absolute URI"))?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(BrokerError::invalid_request(
            "resource must be an absolute URI with a host",
        ));
    }

    let mut canonical = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{port}"));
    }

    let path = url.path().trim_end_matches('/');
    canonical.push_str(path);

    if wildcard {
        canonical.push_str("/*");
    }

    Ok(canonical)
}

/// Check whether a requested resource falls within a bound audience.
///
/// An exact bound audience matches only itself. A bound audience ending in
/// `/*` matches the prefix itself and any path underneath it. A connection
/// with no bound audience matches everything.
#[must_use]
pub fn matches(bound: Option<&str>, requested: &str) -> bool {
    let Some(bound) = bound else {
        return true;
    };

    let Ok(requested) = normalize(requested) else {
        return false;
    };

    if let Some(prefix) = bound.strip_suffix("/*") {
        requested == prefix || requested.starts_with(&format!("{prefix}/"))
    } else {
        requested == bound
    }
}
