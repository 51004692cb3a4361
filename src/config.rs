//! Server configuration module
//! Handles dynamic configuration parameters for the gateway

use crate::constants::{DEFAULT_HOST, DEFAULT_PORT};
use crate::error::{GatewayError, Result};
use std::env;
use std::time::Duration;

/// Gateway configuration parameters
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub connection_timeout: Duration,
    /// JWT secret for bearer-credential verification
    pub jwt_secret: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        panic!("GatewayConfig::default() is not allowed; secrets must come from the environment. Use GatewayConfig::from_env() instead.");
    }
}

impl GatewayConfig {
    /// Create a test configuration. Only for tests.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
            connection_timeout: Duration::from_secs(60),
            jwt_secret: "unit-test-jwt-secret-0123456789-not-for-production".to_string(),
        }
    }

    /// Validate that the JWT secret meets minimum requirements
    fn validate_jwt_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(GatewayError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // Reject known placeholder values
        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "default",
            "secret",
            "password",
            "12345",
        ];
        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(GatewayError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Generate one with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("PARLEY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("PARLEY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let max_connections = env::var("PARLEY_MAX_CONN")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(100);

        let timeout_secs = env::var("PARLEY_TIMEOUT")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(60);

        let jwt_secret = env::var("PARLEY_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                GatewayError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;

        Self::validate_jwt_secret(&jwt_secret)?;

        Ok(Self {
            host,
            port,
            max_connections,
            connection_timeout: Duration::from_secs(timeout_secs),
            jwt_secret,
        })
    }
}
