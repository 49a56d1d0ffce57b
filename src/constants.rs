/// Application constants

// Battle rules (game design, not configurable)
pub const ALLOWED_CARD_COUNTS: [i32; 6] = [1, 3, 5, 10, 20, 50];
pub const NEUTRAL_BOOSTER_MULTIPLIER: i64 = 100; // percent
pub const MIN_BOOSTER_MULTIPLIER: i64 = 1; // percent
pub const MAX_BOOSTER_MULTIPLIER: i64 = 1_000; // percent
pub const MAX_BOOSTERS_PER_ROUND: usize = 5;
// damage columns are NUMERIC(20, 4)
pub const MAX_EFFECTIVE_POWER: i64 = 10_000_000_000_000_000;
pub const POT_SPLIT_DIVISOR: i64 = 2; // half to the winner, half to the moon pot

// Ledger reason tags
pub const REASON_BATTLE_WIN: &str = "battle_win";
pub const REASON_BATTLE_MOON_POT: &str = "battle_moon_pot";

// Matchmaking cache
pub const MATCHMAKING_KEY_PREFIX: &str = "matchmaking";
pub const MATCHMAKING_INDEX_KEYS: &str = "matchmaking:keys";

// Pagination
pub const DEFAULT_PAGE_SIZE: i32 = 20;
pub const MAX_PAGE_SIZE: i32 = 100;

// API version
pub const API_VERSION: &str = "v1";

// WebSocket configuration
pub const WS_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const WS_CLIENT_TIMEOUT_SECS: u64 = 60;
pub const WS_CHANNEL_CAPACITY: usize = 100;
