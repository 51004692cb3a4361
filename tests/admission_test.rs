//! Connection admission integration tests

use std::sync::Arc;

use tokio::sync::mpsc;
use warp::ws::Message as WsMessage;

use parley::auth::role::Role;
use parley::auth::token::{Claims, TokenVerifier};
use parley::core::gateway::Gateway;
use parley::identity::types::{BanRequest, UserRecord};
use parley::identity::{IdentityStore, MemoryIdentityStore};

const TEST_SECRET: &str = "integration-test-jwt-0123456789abcdef";

fn setup() -> (Arc<Gateway>, Arc<MemoryIdentityStore>, TokenVerifier) {
    let store = Arc::new(MemoryIdentityStore::new());
    let verifier = TokenVerifier::new(TEST_SECRET);
    let gateway = Arc::new(Gateway::new(
        store.clone() as Arc<dyn IdentityStore>,
        TokenVerifier::new(TEST_SECRET),
    ));
    (gateway, store, verifier)
}

async fn seed_user(store: &MemoryIdentityStore, id: &str, role: Role, whitelisted: bool) {
    let email = format!("{}@example.com", id);
    store
        .insert_user(UserRecord::new(
            id.to_string(),
            format!("user_{}", id),
            email.clone(),
            role,
        ))
        .await;
    if whitelisted {
        store.allow_email(&email).await;
    }
}

fn token_for(verifier: &TokenVerifier, subject: &str) -> String {
    let claims = Claims::new(subject.to_string(), format!("user_{}", subject), None);
    verifier.issue(&claims).unwrap()
}

/// Drain queued frames into parsed JSON events; the bool reports
/// whether a close frame was queued.
fn drain(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> (Vec<serde_json::Value>, bool) {
    let mut events = Vec::new();
    let mut closed = false;
    while let Ok(msg) = rx.try_recv() {
        if msg.is_close() {
            closed = true;
        } else if let Ok(text) = msg.to_str() {
            events.push(serde_json::from_str(text).unwrap());
        }
    }
    (events, closed)
}

fn event_names(events: &[serde_json::Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e["event"].as_str().map(String::from))
        .collect()
}

#[tokio::test]
async fn test_admission_welcome_sequence() {
    let (gateway, store, verifier) = setup();
    seed_user(&store, "alice", Role::Member, true).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "alice");
    gateway
        .admit_connection("conn-a".to_string(), Some(&token), Some("alice"), tx)
        .await
        .expect("admission should succeed");

    let (events, closed) = drain(&mut rx);
    let names = event_names(&events);
    assert!(!closed);
    assert_eq!(
        names,
        vec!["roleUpdated", "friends", "ignoredUsers", "users"]
    );

    let role_event = &events[0];
    assert_eq!(role_event["role"], "member");

    let users = events[3]["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], "conn-a");
    assert_eq!(users[0]["isBanned"], false);
    // No credential material in the snapshot
    assert!(users[0].get("token").is_none());
    assert!(users[0].get("email").is_none());
}

#[tokio::test]
async fn test_missing_credential_rejected_as_guest() {
    let (gateway, _store, _verifier) = setup();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = gateway
        .admit_connection("conn-a".to_string(), None, None, tx)
        .await;
    assert!(result.is_err());

    let (events, _) = drain(&mut rx);
    assert_eq!(event_names(&events), vec!["notWhitelisted"]);
    assert!(events[0]["message"]
        .as_str()
        .unwrap()
        .contains("Guest access"));
    assert_eq!(gateway.connection_count().await, 0);
}

#[tokio::test]
async fn test_subject_mismatch_rejected() {
    let (gateway, store, verifier) = setup();
    seed_user(&store, "alice", Role::Member, true).await;
    seed_user(&store, "bob", Role::Member, true).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "alice");
    let result = gateway
        .admit_connection("conn-a".to_string(), Some(&token), Some("bob"), tx)
        .await;
    assert!(result.is_err());
    assert_eq!(gateway.connection_count().await, 0);
}

#[tokio::test]
async fn test_unknown_subject_rejected() {
    let (gateway, _store, verifier) = setup();

    let (tx, _rx) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "ghost");
    let result = gateway
        .admit_connection("conn-a".to_string(), Some(&token), Some("ghost"), tx)
        .await;
    assert!(result.is_err());
    assert_eq!(gateway.connection_count().await, 0);
}

#[tokio::test]
async fn test_non_whitelisted_member_rejected() {
    let (gateway, store, verifier) = setup();
    seed_user(&store, "alice", Role::Member, false).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "alice");
    let result = gateway
        .admit_connection("conn-a".to_string(), Some(&token), Some("alice"), tx)
        .await;
    assert!(result.is_err());

    let (events, _) = drain(&mut rx);
    assert_eq!(event_names(&events), vec!["notWhitelisted"]);
    assert!(events[0]["message"]
        .as_str()
        .unwrap()
        .contains("not whitelisted"));
    assert_eq!(gateway.connection_count().await, 0);
}

#[tokio::test]
async fn test_staff_bypasses_whitelist() {
    let (gateway, store, verifier) = setup();
    seed_user(&store, "mira", Role::Mod, false).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "mira");
    gateway
        .admit_connection("conn-m".to_string(), Some(&token), Some("mira"), tx)
        .await
        .expect("mod should bypass the whitelist");
    assert_eq!(gateway.connection_count().await, 1);
}

#[tokio::test]
async fn test_banned_user_admitted_with_notice() {
    let (gateway, store, verifier) = setup();
    seed_user(&store, "alice", Role::Member, true).await;
    store
        .ban_user(
            "seed",
            BanRequest {
                target_id: "alice".to_string(),
                reason: "spam".to_string(),
                hours: Some(2),
                permanent: false,
            },
        )
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "alice");
    gateway
        .admit_connection("conn-a".to_string(), Some(&token), Some("alice"), tx)
        .await
        .expect("banned users are admitted, not rejected");

    let (events, _) = drain(&mut rx);
    let names = event_names(&events);
    assert_eq!(
        names,
        vec![
            "roleUpdated",
            "userRestricted",
            "friends",
            "ignoredUsers",
            "users"
        ]
    );
    assert_eq!(events[1]["type"], "ban");

    let users = events[4]["users"].as_array().unwrap();
    assert_eq!(users[0]["isBanned"], true);
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_broadcasts() {
    let (gateway, store, verifier) = setup();
    seed_user(&store, "alice", Role::Member, true).await;
    seed_user(&store, "bob", Role::Member, true).await;

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "alice");
    gateway
        .admit_connection("conn-a".to_string(), Some(&token), Some("alice"), tx_a)
        .await
        .unwrap();
    let (tx_b, _rx_b) = mpsc::unbounded_channel();
    let token = token_for(&verifier, "bob");
    gateway
        .admit_connection("conn-b".to_string(), Some(&token), Some("bob"), tx_b)
        .await
        .unwrap();

    drain(&mut rx_a);
    gateway.disconnect("conn-b").await;
    assert_eq!(gateway.connection_count().await, 1);

    // Remaining clients see the shrunken snapshot
    let (events, _) = drain(&mut rx_a);
    let users = events.last().unwrap()["users"].as_array().unwrap().clone();
    assert_eq!(users.len(), 1);

    // Second removal is a no-op
    gateway.disconnect("conn-b").await;
    assert_eq!(gateway.connection_count().await, 1);
}
