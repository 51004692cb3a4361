use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    // Admission errors
    AuthenticationFailure(String),
    NotWhitelisted,

    // Per-event denials
    AuthorizationDenied(String),
    PolicyDenied(String),

    // Registry errors
    SessionNotFound(String),

    // Collaborator errors
    IdentityStore(String),

    // Wire errors
    ConnectionClosed,

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailure(msg) => write!(f, "Authentication failure: {}", msg),
            Self::NotWhitelisted => write!(f, "Account is not whitelisted"),
            Self::AuthorizationDenied(msg) => write!(f, "Authorization denied: {}", msg),
            Self::PolicyDenied(msg) => write!(f, "{}", msg),
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::IdentityStore(msg) => write!(f, "Identity store error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for GatewayError {}

// Generic result type for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;
