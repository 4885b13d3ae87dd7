// ABOUTME: Dependency bundle shared by every HTTP handler
// ABOUTME: Built once at startup; handlers receive it as Arc<BrokerResources>
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use crate::auth::{AuthStrategy, BrokerTokenStrategy, InternalTokenStrategy};
use crate::broker::AuthorizationBroker;
use crate::config::ServerConfig;
use crate::errors::BrokerResult;
use crate::registry::ClientRegistry;
use crate::store::pending::PendingRequestStore;
use crate::store::TokenStore;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Everything the route handlers need, wired once at startup.
pub struct BrokerResources {
    pub config: Arc<ServerConfig>,
    pub broker: Arc<AuthorizationBroker>,
    store: TokenStore,
    pending: PendingRequestStore,
    internal_strategy: InternalTokenStrategy,
    broker_strategy: BrokerTokenStrategy,
}

impl BrokerResources {
    /// Wire the broker and its authentication strategies around a database
    /// pool.
    ///
    /// # Errors
    /// Fails if the broker's upstream HTTP client cannot be built.
    pub fn new(config: ServerConfig, pool: SqlitePool) -> BrokerResult<Self> {
        let config = Arc::new(config);

        let registry = ClientRegistry::new(pool.clone());
        let store = TokenStore::new(pool);
        let pending = PendingRequestStore::new();

        let broker = Arc::new(AuthorizationBroker::new(
            Arc::clone(&config),
            registry,
            store.clone(),
            pending.clone(),
        )?);

        let internal_strategy = InternalTokenStrategy::new(&config.internal_token_secret);
        let broker_strategy = BrokerTokenStrategy::new(Arc::clone(&broker));

        Ok(Self {
            config,
            broker,
            store,
            pending,
            internal_strategy,
            broker_strategy,
        })
    }

    /// Create the schema if it does not exist.
    ///
    /// # Errors
    /// Fails with `Storage` if schema creation fails.
    pub async fn migrate(&self) -> BrokerResult<()> {
        self.store.migrate().await
    }

    /// Spawn the expiry sweeper and the pending-request cleanup task.
    pub fn spawn_background_tasks(&self) {
        let interval = self.config.sweep_interval;
        self.store.spawn_sweeper(interval);
        self.pending.spawn_cleanup(interval);
    }

    /// Authentication strategies in evaluation order: internal signed
    /// tokens, then broker-issued opaque tokens.
    #[must_use]
    pub fn auth_strategies(&self) -> [&dyn AuthStrategy; 2] {
        [&self.internal_strategy, &self.broker_strategy]
    }
}
