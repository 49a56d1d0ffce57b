pub mod battle_engine;
pub mod matchmaking;
pub mod notification_service;
pub mod round_resolver;

pub use battle_engine::BattleEngine;
pub use matchmaking::RedisMatchmakingIndex;
pub use notification_service::NotificationService;
