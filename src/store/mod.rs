//! Transactional storage seams used by the battle engine.
//!
//! Every state-changing battle operation runs inside one [`BattleTx`]: the battle row
//! is locked first, the cards it touches are locked next, and all writes commit
//! together. Dropping a transaction without calling [`BattleTx::commit`] rolls it back.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    error::Result,
    models::{Battle, BattleCard, Card, NewBattle, NewBattleCard, OpenBattleQuery},
};

#[async_trait]
pub trait BattleStore: Send {
    /// Loads the battle and holds a row lock on it until the transaction ends.
    async fn lock_battle(&mut self, battle_id: i64) -> Result<Option<Battle>>;

    async fn insert_battle(&mut self, battle: NewBattle) -> Result<Battle>;

    async fn update_battle(&mut self, battle: &Battle) -> Result<()>;

    async fn insert_battle_cards(&mut self, cards: Vec<NewBattleCard>) -> Result<Vec<BattleCard>>;

    async fn battle_cards(&mut self, battle_id: i64) -> Result<Vec<BattleCard>>;

    async fn update_battle_card(&mut self, card: &BattleCard) -> Result<()>;
}

#[async_trait]
pub trait CardStore: Send {
    /// Locks every card in `card_ids` for `owner_id` and returns them in submission
    /// order. Fails with `InvalidCardSelection` when any card is missing, owned by
    /// someone else or already locked.
    async fn lock_cards(&mut self, card_ids: &[i64], owner_id: i64) -> Result<Vec<Card>>;

    async fn unlock_cards(&mut self, card_ids: &[i64]) -> Result<()>;

    async fn delete_cards(&mut self, card_ids: &[i64]) -> Result<()>;
}

#[async_trait]
pub trait StakeLedger: Send {
    async fn credit_balance(
        &mut self,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()>;

    async fn credit_moon_pot(
        &mut self,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()>;

    async fn record_outcome(&mut self, winner_id: i64, loser_id: i64) -> Result<()>;
}

#[async_trait]
pub trait BattleTx: BattleStore + CardStore + StakeLedger {
    async fn commit(self) -> Result<()>;
}

#[async_trait]
pub trait BattleRepository: Send + Sync + 'static {
    type Tx: BattleTx;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn get_battle(&self, battle_id: i64) -> Result<Option<Battle>>;

    async fn get_battle_cards(&self, battle_id: i64) -> Result<Vec<BattleCard>>;

    /// Battles the player took part in, newest first, with the total count.
    async fn list_player_battles(
        &self,
        player_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Battle>, i64)>;

    /// Pending battles still waiting for a second player, oldest first.
    async fn open_battles(&self, query: &OpenBattleQuery, limit: i64) -> Result<Vec<Battle>>;
}

/// Rejects duplicate ids and reorders `cards` to follow `card_ids`.
pub fn order_by_selection(card_ids: &[i64], mut cards: Vec<Card>) -> Option<Vec<Card>> {
    if cards.len() != card_ids.len() {
        return None;
    }
    let mut ordered = Vec::with_capacity(card_ids.len());
    for id in card_ids {
        let position = cards.iter().position(|card| card.id == *id)?;
        ordered.push(cards.swap_remove(position));
    }
    Some(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: i64) -> Card {
        Card {
            id,
            owner_id: 1,
            name: format!("card-{}", id),
            rarity: "common".to_string(),
            power_level: 100,
            stake_value: 1,
            locked: false,
        }
    }

    #[test]
    fn order_by_selection_follows_submission_order() {
        let ordered = order_by_selection(&[3, 1, 2], vec![card(1), card(2), card(3)])
            .expect("all cards present");
        let ids: Vec<i64> = ordered.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn order_by_selection_rejects_missing_card() {
        assert!(order_by_selection(&[1, 4], vec![card(1), card(2)]).is_none());
        assert!(order_by_selection(&[1, 2], vec![card(1)]).is_none());
    }
}
