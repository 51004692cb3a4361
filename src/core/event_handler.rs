//! Inbound event dispatch and the per-event failure boundary
//!
//! Every named client event is handled exactly once. Errors raised
//! while handling one event are contained to that event: denials and
//! collaborator failures become an `error` event to the initiating
//! client, and nothing else is affected.

use std::sync::Arc;

use log::{debug, warn};

use crate::core::events::{ClientEvent, ServerEvent};
use crate::core::gateway::{Gateway, InboundMessage};
use crate::error::GatewayError;

pub struct EventHandler {
    gateway: Arc<Gateway>,
}

impl EventHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Parse and dispatch one inbound frame from `connection_id`.
    pub async fn handle_event(&self, connection_id: &str, raw: &str) {
        let event: ClientEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Unparseable event from {}: {}", connection_id, e);
                self.gateway
                    .send_to(
                        connection_id,
                        &ServerEvent::Error {
                            message: "Unrecognized event".to_string(),
                        },
                    )
                    .await;
                return;
            }
        };

        let result = self.dispatch(connection_id, event).await;
        if let Err(e) = result {
            self.surface_error(connection_id, e).await;
        }
    }

    async fn dispatch(
        &self,
        connection_id: &str,
        event: ClientEvent,
    ) -> crate::error::Result<()> {
        match event {
            ClientEvent::SendMessage {
                id,
                text,
                username: _,
                timestamp,
                in_general_chat,
            } => {
                self.gateway
                    .send_message(
                        connection_id,
                        InboundMessage {
                            id,
                            text,
                            timestamp,
                            in_general_chat,
                        },
                    )
                    .await
            }

            ClientEvent::GeneralPrivateMessage {
                id,
                text,
                username: _,
                timestamp,
                to,
            } => {
                self.gateway
                    .send_private_message(
                        connection_id,
                        &to,
                        InboundMessage {
                            id,
                            text,
                            timestamp,
                            in_general_chat: Some(true),
                        },
                        true,
                    )
                    .await
            }

            ClientEvent::SendPrivateMessage {
                id,
                text,
                username: _,
                timestamp,
                to,
            } => {
                self.gateway
                    .send_private_message(
                        connection_id,
                        &to,
                        InboundMessage {
                            id,
                            text,
                            timestamp,
                            in_general_chat: None,
                        },
                        false,
                    )
                    .await
            }

            ClientEvent::KickUser { user_id } => {
                self.gateway.kick_user(connection_id, &user_id).await
            }

            ClientEvent::BanUser {
                user_id,
                hours,
                is_permanent,
                reason,
            } => {
                self.gateway
                    .ban_user(
                        connection_id,
                        &user_id,
                        hours,
                        is_permanent.unwrap_or(false),
                        reason,
                    )
                    .await
            }

            ClientEvent::UpdateUserRole { user_id, role } => {
                self.gateway
                    .update_user_role(connection_id, &user_id, role)
                    .await
            }

            ClientEvent::UnignoreUser { user_id } => {
                self.gateway.unignore_user(connection_id, &user_id).await
            }

            ClientEvent::UpdateUsername { new_username } => {
                self.gateway
                    .update_username(connection_id, new_username)
                    .await
            }

            ClientEvent::UpdateAvatar { avatar_id } => {
                self.gateway.update_avatar(connection_id, avatar_id).await
            }

            ClientEvent::UpdateStarPawn { show_star_pawn } => {
                self.gateway
                    .update_star_pawn(connection_id, show_star_pawn)
                    .await
            }

            ClientEvent::UpdatePawn { pawn_type } => {
                self.gateway.update_pawn(connection_id, pawn_type).await
            }

            ClientEvent::RequestUserUpdate {} => self.gateway.refresh_user(connection_id).await,
        }
    }

    /// Map a handling error to user-visible behavior. Denials carry
    /// their reason; anything unexpected degrades to a log entry so it
    /// can never take the connection down.
    async fn surface_error(&self, connection_id: &str, error: GatewayError) {
        let message = match &error {
            GatewayError::PolicyDenied(msg) => Some(msg.clone()),
            GatewayError::AuthorizationDenied(msg) => Some(msg.clone()),
            GatewayError::IdentityStore(msg) => Some(msg.clone()),
            GatewayError::SessionNotFound(_) => {
                Some("User not found or not authenticated".to_string())
            }
            // Session gone mid-handling, nothing to notify
            GatewayError::ConnectionClosed => None,
            other => {
                warn!("Unexpected error handling event from {}: {}", connection_id, other);
                None
            }
        };

        if let Some(message) = message {
            debug!("Denied event from {}: {}", connection_id, message);
            self.gateway
                .send_to(connection_id, &ServerEvent::Error { message })
                .await;
        }
    }
}
