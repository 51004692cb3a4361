use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use warp::{self, Filter};

use parley::auth::role::Role;
use parley::auth::token::TokenVerifier;
use parley::config::GatewayConfig;
use parley::constants::WS_PATH;
use parley::core::gateway::{Gateway, SharedGateway};
use parley::handlers::websocket::{handle_ws_client, ConnectQuery};
use parley::identity::types::UserRecord;
use parley::identity::MemoryIdentityStore;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) => eprintln!("No .env file loaded: {}", e),
    };

    // Initialize logging
    env_logger::init();

    // Load config from the environment
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    let identity = Arc::new(MemoryIdentityStore::new());
    seed_dev_owner(&identity).await;

    let verifier = TokenVerifier::new(&config.jwt_secret);
    let gateway: SharedGateway = Arc::new(Gateway::new(identity, verifier));

    // Create WebSocket route: /ws?token=...&userId=...
    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(warp::query::<ConnectQuery>())
        .and(with_gateway(gateway.clone()))
        .map(|ws: warp::ws::Ws, query: ConnectQuery, gateway: SharedGateway| {
            info!("New websocket connection");
            ws.on_upgrade(move |socket| handle_ws_client(socket, query, gateway))
        });

    // Create health check route
    let health_route = warp::path("health").map(|| "OK");

    let routes = ws_route.or(health_route);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Parley gateway on {}", addr);
    warp::serve(routes).run(addr).await;
}

/// Seed an owner account from PARLEY_DEV_OWNER="id:username:email" so a
/// fresh in-memory store is usable in development.
async fn seed_dev_owner(identity: &Arc<MemoryIdentityStore>) {
    let raw = match std::env::var("PARLEY_DEV_OWNER") {
        Ok(raw) => raw,
        Err(_) => return,
    };
    let parts: Vec<&str> = raw.splitn(3, ':').collect();
    if parts.len() != 3 {
        warn!("Ignoring malformed PARLEY_DEV_OWNER (expected id:username:email)");
        return;
    }
    let user = UserRecord::new(
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
        Role::Owner,
    );
    identity.allow_email(&user.email).await;
    identity.insert_user(user).await;
    info!("Seeded development owner account {}", parts[0]);
}

// Helper function to include gateway state in requests
fn with_gateway(
    gateway: SharedGateway,
) -> impl Filter<Extract = (SharedGateway,), Error = Infallible> + Clone {
    warp::any().map(move || gateway.clone())
}
