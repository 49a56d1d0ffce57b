// src/api/mod.rs

pub mod auth;
pub mod battles;
pub mod health;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::services::{BattleEngine, NotificationService};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub redis: ConnectionManager,
    pub config: Config,
    pub engine: Arc<BattleEngine<Database>>,
    pub notifications: Arc<NotificationService>,
}

/// Resolves the calling player from a `Bearer` token.
pub async fn require_player(headers: &HeaderMap, state: &AppState) -> Result<i64> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::AuthError("Missing Authorization header".to_string()))?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::AuthError("Invalid Authorization header".to_string()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::AuthError("Invalid Authorization scheme".to_string()))?;

    auth::extract_player_from_token(token, &state.config.jwt_secret)
}

/// Player actions that share the battle rate limit, each with its own window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleAction {
    Create,
    Join,
    Play,
    Cancel,
}

impl BattleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BattleAction::Create => "create",
            BattleAction::Join => "join",
            BattleAction::Play => "play",
            BattleAction::Cancel => "cancel",
        }
    }
}

fn rate_limit_key(player_id: i64, action: BattleAction, window_seconds: u64) -> String {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    format!(
        "battle:rl:{}:{}:{}",
        action.as_str(),
        player_id,
        now / window_seconds.max(1)
    )
}

/// Fixed-window limiter on battle actions. Skipped when Redis is unavailable.
pub async fn enforce_rate_limit(
    state: &AppState,
    player_id: i64,
    action: BattleAction,
) -> Result<()> {
    let window_seconds = state.config.rate_limit_window_secs.max(1);
    let limit = state.config.rate_limit_battle_actions.max(1) as i64;
    let key = rate_limit_key(player_id, action, window_seconds);

    let mut conn = state.redis.clone();
    let count: i64 = match conn.incr(&key, 1_i64).await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("Battle rate limiter skipped (incr failed): {}", err);
            return Ok(());
        }
    };
    if count == 1 {
        let _: std::result::Result<bool, redis::RedisError> =
            conn.expire(&key, window_seconds as i64).await;
    }

    if count > limit {
        tracing::warn!(
            "Battle rate limit exceeded player={} action={} count={}",
            player_id,
            action.as_str(),
            count
        );
        return Err(AppError::RateLimitExceeded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_key_is_scoped_by_action_and_player() {
        let key = rate_limit_key(42, BattleAction::Join, 60);
        assert!(key.starts_with("battle:rl:join:42:"));
        assert_ne!(key, rate_limit_key(43, BattleAction::Join, 60));
    }

    #[test]
    fn cancel_has_its_own_rate_limit_window() {
        let cancel = rate_limit_key(42, BattleAction::Cancel, 60);
        assert!(cancel.starts_with("battle:rl:cancel:42:"));
        assert_ne!(cancel, rate_limit_key(42, BattleAction::Create, 60));
    }
}
