// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const WS_PATH: &str = "ws";

// Per-role send cooldowns, in milliseconds
pub const GUEST_COOLDOWN_MS: u64 = 3000;
pub const MEMBER_COOLDOWN_MS: u64 = 1000;
pub const MOD_COOLDOWN_MS: u64 = 500;
pub const OWNER_COOLDOWN_MS: u64 = 0;

// Temporary ban duration bounds, in hours (permanent bans are owner-only)
pub const MIN_BAN_HOURS: u32 = 1;
pub const MAX_BAN_HOURS: u32 = 6;
