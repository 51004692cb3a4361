//! Wire event types for the gateway protocol

use serde::{Deserialize, Serialize};

use crate::auth::role::Role;
use crate::identity::types::UserRecord;

/// Client-to-server events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Chat message to the general channel (or a room the client renders)
    #[serde(rename = "sendMessage")]
    SendMessage {
        id: String,
        text: String,
        username: String,
        timestamp: String,
        in_general_chat: Option<bool>,
    },

    /// Direct message rendered in the recipient's general channel
    #[serde(rename = "generalPrivateMessage")]
    GeneralPrivateMessage {
        id: String,
        text: String,
        username: String,
        timestamp: String,
        to: String,
    },

    /// Direct message rendered in a private channel
    #[serde(rename = "sendPrivateMessage")]
    SendPrivateMessage {
        id: String,
        text: String,
        username: String,
        timestamp: String,
        to: String,
    },

    /// Kick a connected user (requires moderation rights)
    #[serde(rename = "kickUser")]
    KickUser { user_id: String },

    /// Ban a connected user (requires moderation rights)
    #[serde(rename = "banUser")]
    BanUser {
        user_id: String,
        hours: Option<u32>,
        is_permanent: Option<bool>,
        reason: String,
    },

    /// Change a connected user's role (owner only)
    #[serde(rename = "updateUserRole")]
    UpdateUserRole { user_id: String, role: Role },

    /// Stop ignoring a user
    #[serde(rename = "unignoreUser")]
    UnignoreUser { user_id: String },

    /// Change display name (live session only)
    #[serde(rename = "updateUsername")]
    UpdateUsername { new_username: String },

    /// Change avatar
    #[serde(rename = "updateAvatar")]
    UpdateAvatar { avatar_id: String },

    /// Toggle the star pawn cosmetic
    #[serde(rename = "updateStarPawn")]
    UpdateStarPawn { show_star_pawn: bool },

    /// Change pawn type
    #[serde(rename = "updatePawn")]
    UpdatePawn { pawn_type: String },

    /// Re-sync session cosmetics from the identity store
    #[serde(rename = "requestUserUpdate")]
    RequestUserUpdate {},
}

/// Server-to-client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "roleUpdated")]
    RoleUpdated { role: Role },

    /// Sender restriction notice (currently ban only); the session stays connected
    #[serde(rename = "userRestricted")]
    UserRestricted {
        #[serde(rename = "type")]
        kind: String,
        message: String,
    },

    #[serde(rename = "notWhitelisted")]
    NotWhitelisted { message: String },

    #[serde(rename = "friends")]
    Friends { friends: Vec<UserSummary> },

    #[serde(rename = "ignoredUsers")]
    IgnoredUsers { users: Vec<UserSummary> },

    /// Full presence snapshot of every connected session
    #[serde(rename = "users")]
    Users { users: Vec<PresenceUser> },

    /// General-channel message (broadcast or general-channel private)
    #[serde(rename = "message")]
    Message {
        id: String,
        text: String,
        username: String,
        timestamp: String,
        from: String,
        role: Role,
        #[serde(skip_serializing_if = "Option::is_none")]
        in_general_chat: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_private: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },

    #[serde(rename = "privateMessage")]
    PrivateMessage {
        id: String,
        text: String,
        username: String,
        timestamp: String,
        from: String,
        to: String,
        role: Role,
        is_private: bool,
    },

    #[serde(rename = "kicked")]
    Kicked {},

    #[serde(rename = "banSuccess")]
    BanSuccess { message: String },

    #[serde(rename = "roleUpdateSuccess")]
    RoleUpdateSuccess { message: String },

    /// Targeted cosmetic refresh for one session
    #[serde(rename = "userUpdated")]
    UserUpdated {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pawn: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        show_star_pawn: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        powers: Option<Vec<String>>,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Public attributes of a connected session, as carried by the
/// `users` presence snapshot. Authentication material never appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub is_banned: bool,
    pub avatar: Option<String>,
    pub show_star_pawn: bool,
    pub pawn: Option<String>,
}

/// Identity-store user projection for friend and ignore lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub avatar: Option<String>,
}

impl From<UserRecord> for UserSummary {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            avatar: user.avatar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let raw = r#"{"event":"sendMessage","id":"m1","text":"hi","username":"alice","timestamp":"2026-01-01T00:00:00Z","inGeneralChat":true}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::SendMessage {
                text,
                in_general_chat,
                ..
            } => {
                assert_eq!(text, "hi");
                assert_eq!(in_general_chat, Some(true));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_ban_event_fields() {
        let raw = r#"{"event":"banUser","userId":"conn-9","hours":2,"reason":"spam"}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::BanUser {
                user_id,
                hours,
                is_permanent,
                reason,
            } => {
                assert_eq!(user_id, "conn-9");
                assert_eq!(hours, Some(2));
                assert_eq!(is_permanent, None);
                assert_eq!(reason, "spam");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_server_event_tag_and_type_field() {
        let event = ServerEvent::UserRestricted {
            kind: "ban".to_string(),
            message: "banned".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"userRestricted\""));
        assert!(json.contains("\"type\":\"ban\""));
    }

    #[test]
    fn test_message_omits_absent_fields() {
        let event = ServerEvent::Message {
            id: "m1".to_string(),
            text: "hi".to_string(),
            username: "alice".to_string(),
            timestamp: "t".to_string(),
            from: "conn-1".to_string(),
            role: Role::Member,
            in_general_chat: Some(true),
            is_private: None,
            to: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("isPrivate"));
        assert!(!json.contains("\"to\""));
    }
}
