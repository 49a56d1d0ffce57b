//! Short-lived cache of open battles, keyed by style, card count and skill level.
//!
//! Entries are not per requester: callers filter out their own battles. Every
//! written key is tracked in [`MATCHMAKING_INDEX_KEYS`] so a join can drop all of
//! them at once.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{
    constants::{MATCHMAKING_INDEX_KEYS, MATCHMAKING_KEY_PREFIX},
    error::{AppError, Result},
    models::{Battle, BattleStyle, OpenBattleQuery, SkillLevel},
};

#[async_trait]
pub trait MatchmakingIndex: Send + Sync {
    /// `Ok(None)` is a miss.
    async fn query(&self, query: &OpenBattleQuery) -> Result<Option<Vec<Battle>>>;

    async fn store(&self, query: &OpenBattleQuery, battles: &[Battle]) -> Result<()>;

    /// Drops every entry for this style and card count, across skill levels.
    async fn invalidate(&self, battle_style: BattleStyle, card_count: i32) -> Result<()>;

    /// Drops every entry.
    async fn flush(&self) -> Result<()>;
}

pub fn cache_key(
    battle_style: BattleStyle,
    card_count: i32,
    skill_level: Option<SkillLevel>,
) -> String {
    format!(
        "{}:{}:{}:{}",
        MATCHMAKING_KEY_PREFIX,
        battle_style,
        card_count,
        skill_level.map(|level| level.as_str()).unwrap_or("any")
    )
}

fn keys_for(battle_style: BattleStyle, card_count: i32) -> Vec<String> {
    std::iter::once(None)
        .chain(SkillLevel::all().into_iter().map(Some))
        .map(|level| cache_key(battle_style, card_count, level))
        .collect()
}

#[derive(Clone)]
pub struct RedisMatchmakingIndex {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisMatchmakingIndex {
    pub fn new(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self { conn, ttl_secs }
    }
}

#[async_trait]
impl MatchmakingIndex for RedisMatchmakingIndex {
    async fn query(&self, query: &OpenBattleQuery) -> Result<Option<Vec<Battle>>> {
        let key = cache_key(query.battle_style, query.card_count, query.skill_level);
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(&key).await?;
        match cached {
            Some(payload) => {
                let battles = serde_json::from_str(&payload).map_err(|e| {
                    AppError::Internal(format!("corrupt matchmaking entry {}: {}", key, e))
                })?;
                Ok(Some(battles))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, query: &OpenBattleQuery, battles: &[Battle]) -> Result<()> {
        let key = cache_key(query.battle_style, query.card_count, query.skill_level);
        let payload = serde_json::to_string(battles)
            .map_err(|e| AppError::Internal(format!("encode matchmaking entry: {}", e)))?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(&key, payload, self.ttl_secs).await?;
        let _: i64 = conn.sadd(MATCHMAKING_INDEX_KEYS, &key).await?;
        Ok(())
    }

    async fn invalidate(&self, battle_style: BattleStyle, card_count: i32) -> Result<()> {
        let keys = keys_for(battle_style, card_count);
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(&keys).await?;
        let _: i64 = conn.srem(MATCHMAKING_INDEX_KEYS, &keys).await?;
        tracing::debug!(
            "Matchmaking cache invalidated for {} x{}",
            battle_style,
            card_count
        );
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.smembers(MATCHMAKING_INDEX_KEYS).await?;
        if !keys.is_empty() {
            let _: i64 = conn.del(&keys).await?;
        }
        let _: i64 = conn.del(MATCHMAKING_INDEX_KEYS).await?;
        tracing::debug!("Matchmaking cache flushed ({} keys)", keys.len());
        Ok(())
    }
}
