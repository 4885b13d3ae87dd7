// ABOUTME: In-memory store for pending local-approval authorization requests
// ABOUTME: LRU cache with TTL, compare-and-set status transitions, background cleanup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::constants::lifetimes::PENDING_REQUEST_MINUTES;
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::models::{PendingAuthorizationRequest, PendingStatus};
use chrono::{Duration as ChronoDuration, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_PENDING_REQUESTS: usize = 10_000;

/// Parameters captured when an authorization request enters the approval
/// queue.
#[derive(Debug, Clone)]
pub struct PendingRequestParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub client_state: Option<String>,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub resource: Option<String>,
}

/// Store of in-flight authorization requests awaiting approval or denial.
///
/// Requests are short-lived and never survive a restart, so they live in
/// memory rather than SQLite.
#[derive(Clone)]
pub struct PendingRequestStore {
    requests: Arc<RwLock<LruCache<String, PendingAuthorizationRequest>>>,
}

impl Default for PendingRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequestStore {
    #[must_use]
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(MAX_PENDING_REQUESTS)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            requests: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    /// Record a new pending request and return it.
    pub async fn create(&self, params: PendingRequestParams) -> PendingAuthorizationRequest {
        let now = Utc::now();
        let request = PendingAuthorizationRequest {
            request_id: Uuid::new_v4().to_string(),
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            scope: params.scope,
            client_state: params.client_state,
            code_challenge: params.code_challenge,
            code_challenge_method: params.code_challenge_method,
            resource: params.resource,
            status: PendingStatus::Pending,
            created_at: now,
            expires_at: now + ChronoDuration::minutes(PENDING_REQUEST_MINUTES),
        };

        let mut requests = self.requests.write().await;
        requests.put(request.request_id.clone(), request.clone());
        request
    }

    /// Fetch a request by id.
    ///
    /// # Errors
    /// Fails with `RequestNotFound` for unknown ids and `RequestExpired`
    /// past the TTL (the entry is dropped on that read).
    pub async fn get(&self, request_id: &str) -> BrokerResult<PendingAuthorizationRequest> {
        let mut requests = self.requests.write().await;

        let Some(request) = requests.get(request_id) else {
            return Err(BrokerError::new(
                ErrorKind::RequestNotFound,
                "authorization request not found",
            ));
        };

        if request.expires_at <= Utc::now() {
            requests.pop(request_id);
            return Err(BrokerError::new(
                ErrorKind::RequestExpired,
                "authorization request has expired",
            ));
        }

        Ok(request.clone())
    }

    /// Transition a pending request to a terminal status.
    ///
    /// The check and the write happen under one write lock, so concurrent
    /// approve/deny calls race safely: exactly one wins.
    ///
    /// # Errors
    /// Fails with `RequestNotFound`, `RequestExpired`, or
    /// `RequestAlreadyProcessed` when the request is not in `Pending`.
    pub async fn transition(
        &self,
        request_id: &str,
        status: PendingStatus,
    ) -> BrokerResult<PendingAuthorizationRequest> {
        debug_assert_ne!(status, PendingStatus::Pending);

        let mut requests = self.requests.write().await;

        let Some(request) = requests.get_mut(request_id) else {
            return Err(BrokerError::new(
                ErrorKind::RequestNotFound,
                "authorization request not found",
            ));
        };

        if request.expires_at <= Utc::now() {
            requests.pop(request_id);
            return Err(BrokerError::new(
                ErrorKind::RequestExpired,
                "authorization request has expired",
            ));
        }

        if request.status != PendingStatus::Pending {
            return Err(BrokerError::new(
                ErrorKind::RequestAlreadyProcessed,
                "authorization request was already approved or denied",
            ));
        }

        request.status = status;
        Ok(request.clone())
    }

    /// Force a request into `Denied` regardless of current status. Used to
    /// roll back an approval whose code issuance failed.
    pub async fn revert_to_denied(&self, request_id: &str) {
        let mut requests = self.requests.write().await;
        if let Some(request) = requests.get_mut(request_id) {
            request.status = PendingStatus::Denied;
        }
    }

    /// Drop expired entries.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut requests = self.requests.write().await;

        let expired: Vec<String> = requests
            .iter()
            .filter(|(_, r)| r.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            requests.pop(id);
        }

        expired.len()
    }

    /// Spawn the periodic cleanup task.
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = store.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "dropped expired authorization requests");
                }
            }
        })
    }
}
