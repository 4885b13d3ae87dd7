// ABOUTME: Bearer-token authentication for the approval endpoints
// ABOUTME: Ordered strategy chain: internal signed tokens first, broker-issued tokens second
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::errors::BrokerResult;
use crate::models::Principal;
use async_trait::async_trait;

pub mod middleware;
pub mod strategies;

pub use middleware::{authenticate_request, AuthenticatedRequest};
pub use strategies::{BrokerTokenStrategy, InternalTokenStrategy};

/// One way of turning a bearer token into a principal.
///
/// `authenticate` returns `Ok(None)` when the token is simply not this
/// strategy's format, so the chain can move on; errors are reserved for
/// tokens that are recognizably this strategy's but invalid in a way worth
/// surfacing directly.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Strategy label used in logs.
    fn name(&self) -> &'static str;

    /// Attempt to authenticate the bearer token.
    async fn authenticate(&self, token: &str) -> BrokerResult<Option<Principal>>;

    /// Check the authenticated token against the resource it is accessing.
    async fn validate_resource_access(&self, token: &str, resource_url: &str) -> BrokerResult<()>;
}
