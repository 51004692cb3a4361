//! Parley - a real-time WebSocket chat gateway
//!
//! This library provides live session management, role-based messaging
//! policy, moderation actions, and broadcast routing over a persistent
//! bidirectional transport.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod identity;

// Re-export main components
pub use config::*;
pub use constants::*;
