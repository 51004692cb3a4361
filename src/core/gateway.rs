//! Gateway service: admission, moderation, and message fan-out
//!
//! Owns the session registry behind an async lock and coordinates the
//! token verifier and identity store. All identity-store calls happen
//! outside the registry lock; fan-out itself is channel sends only.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use warp::ws::Message as WsMessage;

use crate::auth::role::Role;
use crate::auth::token::TokenVerifier;
use crate::core::events::{ServerEvent, UserSummary};
use crate::core::policy;
use crate::core::session::{Session, SessionRegistry};
use crate::error::{GatewayError, Result};
use crate::identity::types::BanRequest;
use crate::identity::IdentityStore;

/// Chat message fields accepted from the client, re-broadcast enriched
/// with the sender's identity.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub text: String,
    pub timestamp: String,
    pub in_general_chat: Option<bool>,
}

pub struct Gateway {
    registry: Arc<RwLock<SessionRegistry>>,
    identity: Arc<dyn IdentityStore>,
    verifier: TokenVerifier,
}

// Shared reference to the gateway
pub type SharedGateway = Arc<Gateway>;

impl Gateway {
    pub fn new(identity: Arc<dyn IdentityStore>, verifier: TokenVerifier) -> Self {
        Self {
            registry: Arc::new(RwLock::new(SessionRegistry::new())),
            identity,
            verifier,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.len()
    }

    // ---- Admission -------------------------------------------------------

    /// Run the admission sequence for a new transport connection.
    ///
    /// On success the session is registered and the welcome sequence
    /// (role, ban notice, friends, ignore list, presence) has been
    /// delivered. On any error the caller must close the transport;
    /// nothing is left registered.
    pub async fn admit_connection(
        &self,
        connection_id: String,
        token: Option<&str>,
        claimed_subject: Option<&str>,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> Result<()> {
        // Guest access is disallowed outright
        let (token, claimed_subject) = match (token, claimed_subject) {
            (Some(token), Some(subject)) if !token.is_empty() && !subject.is_empty() => {
                (token, subject)
            }
            _ => {
                Self::send_over(
                    &sender,
                    &ServerEvent::NotWhitelisted {
                        message: "Guest access is not allowed. Please register with a whitelisted email.".to_string(),
                    },
                );
                return Err(GatewayError::AuthenticationFailure(
                    "missing credential or user id".to_string(),
                ));
            }
        };

        // Credential must verify and belong to the claimed subject
        let claims = self.verifier.verify_subject(token, claimed_subject)?;

        // Subject must resolve to an identity record
        let user = self
            .identity
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| {
                GatewayError::AuthenticationFailure(format!("unknown subject: {}", claims.sub))
            })?;

        // Whitelist gate: staff bypass it
        let allow_listed = self.identity.is_allow_listed(&user.email).await?;
        if !allow_listed && !user.role.is_staff() {
            Self::send_over(
                &sender,
                &ServerEvent::NotWhitelisted {
                    message: "Your account is not whitelisted. Please contact an administrator."
                        .to_string(),
                },
            );
            return Err(GatewayError::NotWhitelisted);
        }

        let banned = self.identity.is_banned(&user.id).await?;
        let powers = self.identity.get_feature_flags(&user.id).await?;
        let friends = self.identity.get_friends(&user.id).await?;
        let ignored = self.identity.get_ignored(&user.id).await?;

        let mut session = Session::new(
            connection_id.clone(),
            user.id.clone(),
            user.username.clone(),
            user.role,
            sender,
        );
        session.banned = banned;
        session.avatar = user.avatar.clone();
        session.show_star_pawn = user.show_star_pawn;
        session.pawn = user.pawn.clone();
        session.powers = powers;

        {
            let mut registry = self.registry.write().await;
            if !registry.admit(session) {
                return Err(GatewayError::SessionNotFound(connection_id));
            }
        }

        info!(
            "Admitted {} ({}, role: {}, banned: {})",
            connection_id,
            user.username,
            user.role.as_str(),
            banned
        );

        // Welcome sequence: role first, then ban notice, then lists
        self.send_to(&connection_id, &ServerEvent::RoleUpdated { role: user.role })
            .await;
        if banned {
            self.send_to(
                &connection_id,
                &ServerEvent::UserRestricted {
                    kind: "ban".to_string(),
                    message: "You are currently banned from sending messages".to_string(),
                },
            )
            .await;
        }
        self.send_to(
            &connection_id,
            &ServerEvent::Friends {
                friends: friends.into_iter().map(UserSummary::from).collect(),
            },
        )
        .await;
        self.send_to(
            &connection_id,
            &ServerEvent::IgnoredUsers {
                users: ignored.into_iter().map(UserSummary::from).collect(),
            },
        )
        .await;

        self.broadcast_presence().await;
        Ok(())
    }

    /// Deregister a connection. Idempotent; triggers a presence
    /// broadcast only when a session was actually removed.
    pub async fn disconnect(&self, connection_id: &str) {
        let removed = {
            let mut registry = self.registry.write().await;
            registry.remove(connection_id)
        };
        match removed {
            Some(session) => {
                info!("Client disconnected: {} ({})", connection_id, session.username);
                self.broadcast_presence().await;
            }
            None => {
                debug!("Disconnect for unknown connection: {}", connection_id);
            }
        }
    }

    // ---- Messaging -------------------------------------------------------

    /// General broadcast: deliver to every connected session except
    /// those whose subject ignores the sender. The sender receives its
    /// own message back.
    pub async fn send_message(&self, connection_id: &str, message: InboundMessage) -> Result<()> {
        let (sender_subject, username) = self
            .sender_context(connection_id, "message")
            .await
            .ok_or(GatewayError::ConnectionClosed)?;

        // Authoritative role, re-fetched per send: a role change between
        // messages must take effect immediately.
        // Content policy runs before the send is accepted: a denied
        // message must not consume the sender's rate allowance.
        let role = self.authoritative_role(&sender_subject).await?;
        policy::check_general_link_policy(
            role,
            message.in_general_chat.unwrap_or(false),
            &message.text,
        )?;
        self.accept_send(connection_id, role).await?;

        // Snapshot recipients under the read lock, query ignore
        // relationships after dropping it.
        let recipients: Vec<(String, String, mpsc::UnboundedSender<WsMessage>)> = {
            let registry = self.registry.read().await;
            registry
                .iter()
                .map(|s| (s.connection_id.clone(), s.subject_id.clone(), s.sender_handle()))
                .collect()
        };

        let mut excluded: Vec<String> = Vec::new();
        for (conn, subject, _) in &recipients {
            if subject == &sender_subject {
                continue;
            }
            if self.identity.is_ignored_by(&sender_subject, subject).await? {
                excluded.push(conn.clone());
            }
        }

        let event = ServerEvent::Message {
            id: message.id,
            text: message.text.clone(),
            username,
            timestamp: message.timestamp,
            from: connection_id.to_string(),
            role,
            in_general_chat: message.in_general_chat,
            is_private: None,
            to: None,
        };
        let frame = match serde_json::to_string(&event) {
            Ok(text) => WsMessage::text(text),
            Err(e) => {
                error!("Failed to serialize broadcast message: {}", e);
                return Ok(());
            }
        };

        let mut delivered = 0;
        for (conn, _, sender) in &recipients {
            if excluded.contains(conn) {
                continue;
            }
            if sender.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            "Broadcast from {} delivered to {} sessions ({} excluded)",
            connection_id,
            delivered,
            excluded.len()
        );
        Ok(())
    }

    /// Direct message to one connection. `general_channel` selects the
    /// client-side rendering channel only; authorization is identical.
    /// An unknown recipient is a silent drop.
    pub async fn send_private_message(
        &self,
        connection_id: &str,
        to: &str,
        message: InboundMessage,
        general_channel: bool,
    ) -> Result<()> {
        let (sender_subject, username) = self
            .sender_context(connection_id, "private message")
            .await
            .ok_or(GatewayError::ConnectionClosed)?;

        let role = self.authoritative_role(&sender_subject).await?;
        // Guests may not send links in direct messages at all
        policy::check_private_link_policy(role, &message.text)?;
        self.accept_send(connection_id, role).await?;

        let recipient_sender = {
            let registry = self.registry.read().await;
            registry.get(to).map(|s| s.sender_handle())
        };
        let recipient_sender = match recipient_sender {
            Some(sender) => sender,
            None => {
                warn!("Private message from {} to unknown recipient: {}", connection_id, to);
                return Ok(());
            }
        };

        let event = if general_channel {
            ServerEvent::Message {
                id: message.id,
                text: message.text,
                username,
                timestamp: message.timestamp,
                from: connection_id.to_string(),
                role,
                in_general_chat: Some(true),
                is_private: Some(true),
                to: Some(to.to_string()),
            }
        } else {
            ServerEvent::PrivateMessage {
                id: message.id,
                text: message.text,
                username,
                timestamp: message.timestamp,
                from: connection_id.to_string(),
                to: to.to_string(),
                role,
                is_private: true,
            }
        };

        let frame = match serde_json::to_string(&event) {
            Ok(text) => WsMessage::text(text),
            Err(e) => {
                error!("Failed to serialize private message: {}", e);
                return Ok(());
            }
        };

        // Recipient copy plus a confirmation echo to the sender
        let _ = recipient_sender.send(frame.clone());
        {
            let registry = self.registry.read().await;
            if let Some(sender) = registry.get(connection_id) {
                sender.send_raw(frame);
            }
        }
        Ok(())
    }

    // ---- Moderation ------------------------------------------------------

    /// Kick: notify the target, then force its transport closed. The
    /// registry entry is removed by the normal disconnect path.
    pub async fn kick_user(&self, actor_conn: &str, target_conn: &str) -> Result<()> {
        let (actor_subject, actor_name) = self.require_actor(actor_conn).await?;
        let (target_subject, target_name) = self.require_target(target_conn).await?;

        let actor_role = self.authoritative_role(&actor_subject).await?;
        let target_role = self.authoritative_role(&target_subject).await?;
        policy::check_moderation(actor_role, target_role)?;

        {
            let registry = self.registry.read().await;
            if let Some(target) = registry.get(target_conn) {
                target.send(&ServerEvent::Kicked {});
                target.close();
            }
        }
        info!("User {} was kicked by {}", target_name, actor_name);
        Ok(())
    }

    /// Ban: record the ban in the identity store, mark the live
    /// session, notify the target (without disconnecting it), and
    /// confirm to the actor.
    pub async fn ban_user(
        &self,
        actor_conn: &str,
        target_conn: &str,
        hours: Option<u32>,
        permanent: bool,
        reason: String,
    ) -> Result<()> {
        let (actor_subject, actor_name) = self.require_actor(actor_conn).await?;
        let (target_subject, target_name) = self.require_target(target_conn).await?;

        let actor_role = self.authoritative_role(&actor_subject).await?;
        let target_role = self.authoritative_role(&target_subject).await?;
        policy::check_moderation(actor_role, target_role)?;
        policy::check_ban_terms(actor_role, hours, permanent)?;

        let request = BanRequest {
            target_id: target_subject,
            reason: reason.clone(),
            hours,
            permanent,
        };
        if let Err(e) = self.identity.ban_user(&actor_subject, request).await {
            error!("Ban of {} by {} failed: {}", target_name, actor_name, e);
            return Err(GatewayError::IdentityStore("Failed to ban user".to_string()));
        }

        {
            let mut registry = self.registry.write().await;
            if let Some(target) = registry.get_mut(target_conn) {
                target.banned = true;
                target.send(&ServerEvent::UserRestricted {
                    kind: "ban".to_string(),
                    message: format!("You have been banned by a moderator. Reason: {}", reason),
                });
            }
        }

        info!("User {} was banned by {}", target_name, actor_name);
        self.broadcast_presence().await;
        self.send_to(
            actor_conn,
            &ServerEvent::BanSuccess {
                message: format!("User {} has been banned", target_name),
            },
        )
        .await;
        Ok(())
    }

    /// Role change: owner only. Persists through the identity store,
    /// then updates the live session and re-broadcasts presence.
    pub async fn update_user_role(
        &self,
        actor_conn: &str,
        target_conn: &str,
        role: Role,
    ) -> Result<()> {
        let (actor_subject, actor_name) = self.require_actor(actor_conn).await?;
        let (target_subject, _) = self.require_target(target_conn).await?;

        let actor_role = self.authoritative_role(&actor_subject).await?;
        policy::check_role_change(actor_role)?;

        if let Err(e) = self
            .identity
            .update_role(&actor_subject, &target_subject, role)
            .await
        {
            error!("Role update of {} by {} failed: {}", target_subject, actor_name, e);
            return Err(GatewayError::IdentityStore(
                "Failed to update user role".to_string(),
            ));
        }

        {
            let mut registry = self.registry.write().await;
            if let Some(target) = registry.get_mut(target_conn) {
                target.role = role;
                target.send(&ServerEvent::RoleUpdated { role });
            }
        }

        info!(
            "User role updated: {} is now {} (by {})",
            target_subject,
            role.as_str(),
            actor_name
        );
        self.broadcast_presence().await;
        self.send_to(
            actor_conn,
            &ServerEvent::RoleUpdateSuccess {
                message: format!("User role has been updated to {}", role.as_str()),
            },
        )
        .await;
        Ok(())
    }

    // ---- Relationship and cosmetic updates -------------------------------

    /// Remove a directional ignore and send the refreshed list back.
    pub async fn unignore_user(&self, connection_id: &str, ignored_subject: &str) -> Result<()> {
        let (subject, username) = self
            .sender_context(connection_id, "unignore")
            .await
            .ok_or(GatewayError::ConnectionClosed)?;

        self.identity.remove_ignore(&subject, ignored_subject).await?;
        let ignored = self.identity.get_ignored(&subject).await?;
        self.send_to(
            connection_id,
            &ServerEvent::IgnoredUsers {
                users: ignored.into_iter().map(UserSummary::from).collect(),
            },
        )
        .await;
        debug!("User {} unignored {}", username, ignored_subject);
        Ok(())
    }

    /// Display-name change is live-session state only.
    pub async fn update_username(&self, connection_id: &str, new_username: String) -> Result<()> {
        {
            let mut registry = self.registry.write().await;
            let session = registry
                .get_mut(connection_id)
                .ok_or(GatewayError::ConnectionClosed)?;
            session.username = new_username.clone();
        }
        info!("Client {} changed username to {}", connection_id, new_username);
        self.broadcast_presence().await;
        Ok(())
    }

    /// Avatar change: session first, then persisted; persistence
    /// failure keeps the live value and is logged only.
    pub async fn update_avatar(&self, connection_id: &str, avatar_id: String) -> Result<()> {
        let subject = {
            let mut registry = self.registry.write().await;
            let session = registry
                .get_mut(connection_id)
                .ok_or(GatewayError::ConnectionClosed)?;
            session.avatar = Some(avatar_id.clone());
            session.subject_id.clone()
        };

        if let Err(e) = self.identity.update_avatar(&subject, &avatar_id).await {
            error!("Failed to persist avatar for {}: {}", subject, e);
        }

        self.broadcast_presence().await;
        Ok(())
    }

    /// Star-pawn toggle: persisted, announced via `userUpdated` to
    /// everyone plus a fresh presence snapshot.
    pub async fn update_star_pawn(&self, connection_id: &str, show: bool) -> Result<()> {
        let subject = {
            let mut registry = self.registry.write().await;
            let session = registry
                .get_mut(connection_id)
                .ok_or(GatewayError::ConnectionClosed)?;
            session.show_star_pawn = show;
            session.subject_id.clone()
        };

        if let Err(e) = self.identity.update_star_pawn(&subject, show).await {
            error!("Failed to persist star pawn for {}: {}", subject, e);
        }

        self.send_to_all(&ServerEvent::UserUpdated {
            id: connection_id.to_string(),
            avatar: None,
            pawn: None,
            show_star_pawn: Some(show),
            powers: None,
        })
        .await;
        self.broadcast_presence().await;
        Ok(())
    }

    /// Pawn change: persistence failure here is surfaced to the client.
    pub async fn update_pawn(&self, connection_id: &str, pawn_type: String) -> Result<()> {
        let subject = {
            let mut registry = self.registry.write().await;
            let session = registry
                .get_mut(connection_id)
                .ok_or(GatewayError::ConnectionClosed)?;
            session.pawn = Some(pawn_type.clone());
            session.subject_id.clone()
        };

        self.identity
            .update_pawn(&subject, &pawn_type)
            .await
            .map_err(|e| {
                error!("Failed to persist pawn for {}: {}", subject, e);
                GatewayError::IdentityStore("Failed to update pawn".to_string())
            })?;

        self.broadcast_presence().await;
        self.send_to(
            connection_id,
            &ServerEvent::UserUpdated {
                id: connection_id.to_string(),
                avatar: None,
                pawn: Some(pawn_type),
                show_star_pawn: None,
                powers: None,
            },
        )
        .await;
        Ok(())
    }

    /// Re-sync cosmetics from the identity store into the live session.
    pub async fn refresh_user(&self, connection_id: &str) -> Result<()> {
        let subject = {
            let registry = self.registry.read().await;
            registry
                .get(connection_id)
                .map(|s| s.subject_id.clone())
                .ok_or(GatewayError::ConnectionClosed)?
        };

        let user = self
            .identity
            .find_by_id(&subject)
            .await?
            .ok_or_else(|| GatewayError::SessionNotFound(subject.clone()))?;

        let powers = {
            let mut registry = self.registry.write().await;
            let session = registry
                .get_mut(connection_id)
                .ok_or(GatewayError::ConnectionClosed)?;
            session.avatar = user.avatar.clone();
            session.show_star_pawn = user.show_star_pawn;
            session.pawn = user.pawn.clone();
            session.powers.clone()
        };

        self.broadcast_presence().await;
        self.send_to(
            connection_id,
            &ServerEvent::UserUpdated {
                id: connection_id.to_string(),
                avatar: user.avatar,
                pawn: user.pawn,
                show_star_pawn: Some(user.show_star_pawn),
                powers: Some(powers),
            },
        )
        .await;
        Ok(())
    }

    // ---- Delivery helpers ------------------------------------------------

    /// Send one event to one connection, if it is still registered.
    pub async fn send_to(&self, connection_id: &str, event: &ServerEvent) {
        let registry = self.registry.read().await;
        if let Some(session) = registry.get(connection_id) {
            session.send(event);
        }
    }

    /// Send one event to every connected session. Serialized once.
    pub async fn send_to_all(&self, event: &ServerEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(text) => WsMessage::text(text),
            Err(e) => {
                error!("Failed to serialize broadcast event: {}", e);
                return;
            }
        };
        let registry = self.registry.read().await;
        for session in registry.iter() {
            session.send_raw(frame.clone());
        }
    }

    /// Broadcast the full presence snapshot to every connection.
    /// Best-effort: sessions disconnecting mid-broadcast are corrected
    /// by the next snapshot.
    pub async fn broadcast_presence(&self) {
        let event = {
            let registry = self.registry.read().await;
            ServerEvent::Users {
                users: registry.presence_snapshot(),
            }
        };
        self.send_to_all(&event).await;
    }

    // ---- Internal --------------------------------------------------------

    fn send_over(sender: &mpsc::UnboundedSender<WsMessage>, event: &ServerEvent) {
        if let Ok(text) = serde_json::to_string(event) {
            let _ = sender.send(WsMessage::text(text));
        }
    }

    /// Resolve sender subject id and display name; a missing session
    /// (message racing a disconnect) is logged, not an error event.
    async fn sender_context(&self, connection_id: &str, context: &str) -> Option<(String, String)> {
        let registry = self.registry.read().await;
        match registry.get(connection_id) {
            Some(session) => Some((session.subject_id.clone(), session.username.clone())),
            None => {
                warn!("{} from unknown connection: {}", context, connection_id);
                None
            }
        }
    }

    /// The authoritative role comes from the identity store, not the
    /// cached session field.
    async fn authoritative_role(&self, subject_id: &str) -> Result<Role> {
        Ok(self
            .identity
            .find_by_id(subject_id)
            .await?
            .map(|u| u.role)
            .unwrap_or(Role::Guest))
    }

    /// Ban and rate-limit gates for a send, advancing the last-send
    /// timestamp only on acceptance. Check and advance happen under one
    /// write guard so two racing sends cannot both pass the window.
    async fn accept_send(&self, connection_id: &str, role: Role) -> Result<()> {
        let now = Instant::now();
        let mut registry = self.registry.write().await;
        let session = registry
            .get_mut(connection_id)
            .ok_or(GatewayError::ConnectionClosed)?;
        policy::check_not_banned(session.banned)?;
        policy::check_rate_limit(role, session.last_message_at, now)?;
        session.last_message_at = Some(now);
        Ok(())
    }

    /// A moderation actor must be an authenticated registered session.
    async fn require_actor(&self, actor_conn: &str) -> Result<(String, String)> {
        let registry = self.registry.read().await;
        match registry.get(actor_conn) {
            Some(session) if session.authenticated => {
                Ok((session.subject_id.clone(), session.username.clone()))
            }
            _ => {
                warn!("Unauthorized moderation request from: {}", actor_conn);
                Err(GatewayError::AuthorizationDenied(
                    "You do not have permission to moderate users".to_string(),
                ))
            }
        }
    }

    /// Moderation targets are addressed by connection id and resolved
    /// to their subject id through the registry.
    async fn require_target(&self, target_conn: &str) -> Result<(String, String)> {
        let registry = self.registry.read().await;
        match registry.get(target_conn) {
            Some(session) => Ok((session.subject_id.clone(), session.username.clone())),
            None => Err(GatewayError::SessionNotFound(target_conn.to_string())),
        }
    }
}
