// ABOUTME: Logging configuration and structured logging setup for the broker
// ABOUTME: Configures level, formatter, and security-event helpers via tracing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use anyhow::Result;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Service name included in startup log
    pub service_name: String,
}

/// Log output format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    /// `JSON` format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            service_name: "fiscus-auth-broker".into(),
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        Self {
            level,
            format,
            ..Self::default()
        }
    }

    /// Initialize the global tracing subscriber.
    ///
    /// # Errors
    /// Returns an error if a subscriber has already been installed.
    pub fn init(&self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.level)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);

        match self.format {
            LogFormat::Json => {
                registry
                    .with(tracing_subscriber::fmt::layer().json())
                    .try_init()?;
            }
            LogFormat::Pretty => {
                // Default full formatter; human-readable development output
                registry
                    .with(tracing_subscriber::fmt::layer().with_target(true))
                    .try_init()?;
            }
            LogFormat::Compact => {
                registry
                    .with(tracing_subscriber::fmt::layer().compact())
                    .try_init()?;
            }
        }

        tracing::info!(
            service = %self.service_name,
            version = env!("CARGO_PKG_VERSION"),
            level = %self.level,
            "logging initialized"
        );

        Ok(())
    }
}

/// Initialize logging from environment variables.
///
/// # Errors
/// Returns an error if a subscriber has already been installed.
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}

/// Structured security-event logging.
///
/// Events are logged at `warn` for failures and `info` for successes; token
/// material is never included.
pub fn log_security_event(event: &str, client_id: &str, success: bool, details: Option<&str>) {
    if success {
        tracing::info!(
            event = event,
            client_id = client_id,
            details = details.unwrap_or(""),
            "security event"
        );
    } else {
        tracing::warn!(
            event = event,
            client_id = client_id,
            details = details.unwrap_or(""),
            "security event"
        );
    }
}
