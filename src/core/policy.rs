//! Pure policy decisions evaluated on every inbound event
//!
//! Every function here is synchronous and side-effect free; callers
//! feed in the session's current state and act on the verdict.

use std::time::Instant;

use crate::auth::role::Role;
use crate::constants::{MAX_BAN_HOURS, MIN_BAN_HOURS};
use crate::error::{GatewayError, Result};

/// Banned senders are denied all send operations. They stay connected
/// and keep receiving.
pub fn check_not_banned(banned: bool) -> Result<()> {
    if banned {
        return Err(GatewayError::PolicyDenied(
            "You are currently banned from sending messages".to_string(),
        ));
    }
    Ok(())
}

/// Role-keyed anti-flood check, measured from the last accepted send.
///
/// A send at or after `last + cooldown(role)` is accepted; strictly
/// before that boundary it is denied with the remaining wait in whole
/// seconds, rounded up. The caller must not advance the timestamp on
/// denial.
pub fn check_rate_limit(role: Role, last_message_at: Option<Instant>, now: Instant) -> Result<()> {
    let cooldown = role.cooldown();
    if cooldown.is_zero() {
        return Ok(());
    }

    let last = match last_message_at {
        Some(last) => last,
        None => return Ok(()),
    };

    let elapsed = now.saturating_duration_since(last);
    if elapsed >= cooldown {
        return Ok(());
    }

    let remaining_ms = (cooldown - elapsed).as_millis() as u64;
    let remaining_secs = (remaining_ms + 999) / 1000;
    Err(GatewayError::PolicyDenied(format!(
        "Please wait {} seconds before sending another message",
        remaining_secs
    )))
}

/// URL-like substring detection for the link filter
pub fn contains_link(text: &str) -> bool {
    text.contains("http://") || text.contains("https://")
}

/// Link filter for general-channel messages: guests may not post links
/// when the message is flagged for general chat.
pub fn check_general_link_policy(role: Role, in_general_chat: bool, text: &str) -> Result<()> {
    if in_general_chat && role == Role::Guest && contains_link(text) {
        return Err(GatewayError::PolicyDenied(
            "Guests cannot send links in the general chat".to_string(),
        ));
    }
    Ok(())
}

/// Link filter for direct messages: applies to guests regardless of
/// any channel flag.
pub fn check_private_link_policy(role: Role, text: &str) -> Result<()> {
    if role == Role::Guest && contains_link(text) {
        return Err(GatewayError::PolicyDenied(
            "Guests cannot send links in messages".to_string(),
        ));
    }
    Ok(())
}

/// Whether `actor` may kick/ban/moderate `target`.
///
/// Staff only; a mod may not act on another mod or the owner.
pub fn check_moderation(actor: Role, target: Role) -> Result<()> {
    if !actor.is_staff() {
        return Err(GatewayError::AuthorizationDenied(
            "You do not have permission to moderate users".to_string(),
        ));
    }
    if target.is_staff() && actor != Role::Owner {
        return Err(GatewayError::AuthorizationDenied(
            "Only the owner can moderate staff members".to_string(),
        ));
    }
    Ok(())
}

/// Validate ban terms: a duration in [MIN_BAN_HOURS, MAX_BAN_HOURS]
/// hours, or a permanent flag which only the owner may set.
pub fn check_ban_terms(actor: Role, hours: Option<u32>, permanent: bool) -> Result<()> {
    if permanent {
        if actor != Role::Owner {
            return Err(GatewayError::AuthorizationDenied(
                "Only the owner can issue permanent bans".to_string(),
            ));
        }
        return Ok(());
    }
    match hours {
        Some(h) if (MIN_BAN_HOURS..=MAX_BAN_HOURS).contains(&h) => Ok(()),
        Some(h) => Err(GatewayError::PolicyDenied(format!(
            "Ban duration must be between {} and {} hours, got {}",
            MIN_BAN_HOURS, MAX_BAN_HOURS, h
        ))),
        None => Err(GatewayError::PolicyDenied(
            "Ban requires a duration in hours or the permanent flag".to_string(),
        )),
    }
}

/// Arbitrary role assignment is owner-only; mods may not change roles.
pub fn check_role_change(actor: Role) -> Result<()> {
    if actor != Role::Owner {
        return Err(GatewayError::AuthorizationDenied(
            "Only the owner can change user roles".to_string(),
        ));
    }
    Ok(())
}
