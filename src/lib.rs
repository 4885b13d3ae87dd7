// ABOUTME: Fiscus authorization broker library root
// ABOUTME: OAuth 2.0 authorization code + PKCE broker for the Fiscus finance assistant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

//! OAuth 2.0 authorization broker for Fiscus.
//!
//! Implements the authorization code flow with mandatory PKCE (S256),
//! dynamic client registration for public clients, single-use refresh-token
//! rotation, RFC 8707 resource indicators, RFC 7009 revocation, and the
//! well-known metadata documents. Authorization is either federated through
//! an upstream identity provider or resolved locally via an approval queue.

pub mod auth;
pub mod broker;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod logging;
pub mod models;
pub mod pkce;
pub mod registry;
pub mod resource;
pub mod routes;
pub mod state;
pub mod store;
pub mod upstream;

pub use broker::AuthorizationBroker;
pub use config::ServerConfig;
pub use context::BrokerResources;
pub use errors::{BrokerError, BrokerResult, ErrorKind};
