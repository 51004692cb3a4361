//! Authentication and authorization module

pub mod role;
pub mod token;

// Re-export main components
pub use role::Role;
pub use token::{Claims, TokenVerifier};
