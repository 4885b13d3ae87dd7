// ABOUTME: Configuration module for the authorization broker
// ABOUTME: Environment-only configuration, no config files
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

/// Environment-variable based server configuration
pub mod environment;

pub use environment::{ServerConfig, UpstreamIdpConfig};
