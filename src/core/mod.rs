//! Core functionality for the chat gateway

pub mod event_handler;
pub mod events;
pub mod gateway;
pub mod policy;
pub mod session;

// Re-export main components for convenience
pub use event_handler::EventHandler;
pub use events::{ClientEvent, PresenceUser, ServerEvent, UserSummary};
pub use gateway::{Gateway, InboundMessage, SharedGateway};
pub use session::{Session, SessionRegistry};
