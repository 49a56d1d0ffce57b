use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::{constants::WS_CHANNEL_CAPACITY, error::Result, models::BattleEvent};

/// Destination for committed battle events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &BattleEvent) -> Result<()>;
}

/// Fans events out to websocket subscribers, per battle and per player.
#[derive(Default)]
pub struct NotificationService {
    battles: Arc<RwLock<HashMap<i64, broadcast::Sender<BattleEvent>>>>,
    players: Arc<RwLock<HashMap<i64, broadcast::Sender<BattleEvent>>>>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe_battle(&self, battle_id: i64) -> broadcast::Receiver<BattleEvent> {
        subscribe(&self.battles, battle_id).await
    }

    pub async fn subscribe_player(&self, player_id: i64) -> broadcast::Receiver<BattleEvent> {
        subscribe(&self.players, player_id).await
    }

    /// Removes the battle channel once nobody listens to it anymore.
    pub async fn prune_battle(&self, battle_id: i64) {
        prune_idle(&self.battles, battle_id).await;
    }

    /// Drops a player channel once its last socket has gone away.
    pub async fn prune_player(&self, player_id: i64) {
        prune_idle(&self.players, player_id).await;
    }

    async fn send_to(
        channels: &RwLock<HashMap<i64, broadcast::Sender<BattleEvent>>>,
        id: i64,
        event: &BattleEvent,
    ) -> usize {
        let channels = channels.read().await;
        match channels.get(&id) {
            // No receivers is not an error.
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => 0,
        }
    }
}

async fn prune_idle(
    channels: &RwLock<HashMap<i64, broadcast::Sender<BattleEvent>>>,
    key: i64,
) {
    let mut channels = channels.write().await;
    if channels
        .get(&key)
        .is_some_and(|sender| sender.receiver_count() == 0)
    {
        channels.remove(&key);
    }
}

async fn subscribe(
    channels: &RwLock<HashMap<i64, broadcast::Sender<BattleEvent>>>,
    id: i64,
) -> broadcast::Receiver<BattleEvent> {
    let mut channels = channels.write().await;
    if let Some(sender) = channels.get(&id) {
        sender.subscribe()
    } else {
        let (tx, rx) = broadcast::channel(WS_CHANNEL_CAPACITY);
        channels.insert(id, tx);
        rx
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    async fn publish(&self, event: &BattleEvent) -> Result<()> {
        let mut delivered = Self::send_to(&self.battles, event.battle_id(), event).await;
        for player_id in event.player_recipients() {
            delivered += Self::send_to(&self.players, player_id, event).await;
        }

        tracing::info!(
            "Event {} for battle {} delivered to {} subscribers",
            event.kind(),
            event.battle_id(),
            delivered
        );
        Ok(())
    }
}
