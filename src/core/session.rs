//! Live session state and the in-memory session registry
//!
//! The registry is the single source of truth for who is online. It is
//! owned by the gateway behind an async lock; nothing here is global.

use std::collections::HashMap;
use std::time::Instant;

use log::warn;
use tokio::sync::mpsc;
use warp::ws::Message as WsMessage;

use crate::auth::role::Role;
use crate::core::events::{PresenceUser, ServerEvent};

/// State for one live connection.
///
/// Sessions are only created for fully admitted connections, so the
/// subject id is always present. The banned flag is a cache: computed
/// at admission and set again when a ban is issued against a live
/// session. A timed ban therefore lapses on the next reconnect.
pub struct Session {
    pub connection_id: String,
    pub subject_id: String,
    pub username: String,
    pub authenticated: bool,
    pub role: Role,
    pub banned: bool,
    pub avatar: Option<String>,
    pub show_star_pawn: bool,
    pub pawn: Option<String>,
    pub powers: Vec<String>,
    pub last_message_at: Option<Instant>,
    sender: mpsc::UnboundedSender<WsMessage>,
}

impl Session {
    pub fn new(
        connection_id: String,
        subject_id: String,
        username: String,
        role: Role,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> Self {
        Self {
            connection_id,
            subject_id,
            username,
            authenticated: true,
            role,
            banned: false,
            avatar: None,
            show_star_pawn: false,
            pawn: None,
            powers: Vec::new(),
            last_message_at: None,
            sender,
        }
    }

    /// Send a serialized event to this session's transport.
    pub fn send(&self, event: &ServerEvent) -> bool {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize event for {}: {}", self.connection_id, e);
                return false;
            }
        };
        self.send_raw(WsMessage::text(text))
    }

    /// Queue a raw frame for delivery. A send failure means the writer
    /// pump has already shut down; the read loop will clean up shortly.
    pub fn send_raw(&self, message: WsMessage) -> bool {
        match self.sender.send(message) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send to client {}", self.connection_id);
                false
            }
        }
    }

    /// Ask the transport to close by queueing a close frame.
    pub fn close(&self) {
        let _ = self.sender.send(WsMessage::close());
    }

    /// Clone of the delivery channel, for fan-out outside the registry lock.
    pub fn sender_handle(&self) -> mpsc::UnboundedSender<WsMessage> {
        self.sender.clone()
    }

    /// Public attributes for the presence snapshot.
    pub fn presence(&self) -> PresenceUser {
        PresenceUser {
            id: self.connection_id.clone(),
            username: self.username.clone(),
            role: self.role,
            is_banned: self.banned,
            avatar: self.avatar.clone(),
            show_star_pawn: self.show_star_pawn,
            pawn: self.pawn.clone(),
        }
    }
}

/// In-memory mapping from connection id to live session
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Admit a session. Refuses a duplicate connection id; connection
    /// ids are uuid v4 so a collision means a caller bug.
    pub fn admit(&mut self, session: Session) -> bool {
        if self.sessions.contains_key(&session.connection_id) {
            warn!("Refusing duplicate admission for {}", session.connection_id);
            return false;
        }
        self.sessions.insert(session.connection_id.clone(), session);
        true
    }

    /// Remove a session. Idempotent: an absent id is a no-op.
    pub fn remove(&mut self, connection_id: &str) -> Option<Session> {
        self.sessions.remove(connection_id)
    }

    pub fn get(&self, connection_id: &str) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(connection_id)
    }

    /// Look up the session for a subject, if that user is online.
    pub fn find_by_subject(&self, subject_id: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.subject_id == subject_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every connected session's public attributes.
    pub fn presence_snapshot(&self) -> Vec<PresenceUser> {
        self.sessions.values().map(Session::presence).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
