//! In-memory repository for the test suite.
//!
//! A transaction holds the whole-store mutex from `begin` until it is committed or
//! dropped, works on a private copy of the state and swaps it in on commit.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{order_by_selection, BattleRepository, BattleStore, BattleTx, CardStore, StakeLedger};
use crate::{
    error::{AppError, Result},
    models::*,
};

#[derive(Debug, Clone)]
pub struct PlayerAccount {
    pub id: i64,
    pub skill_level: SkillLevel,
    pub charlie_points: Decimal,
    pub moon_pot_points: Decimal,
    pub total_wins: i32,
    pub total_losses: i32,
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub player_id: i64,
    pub battle_id: i64,
    pub account: &'static str,
    pub amount: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub players: BTreeMap<i64, PlayerAccount>,
    pub cards: BTreeMap<i64, Card>,
    pub battles: BTreeMap<i64, Battle>,
    pub battle_cards: BTreeMap<i64, BattleCard>,
    pub ledger: Vec<LedgerEntry>,
    pub fail_credits: bool,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn player(&self, player_id: i64) -> &PlayerAccount {
        &self.players[&player_id]
    }

    pub fn battle(&self, battle_id: i64) -> &Battle {
        &self.battles[&battle_id]
    }

    pub fn cards_of_battle(&self, battle_id: i64) -> Vec<BattleCard> {
        self.battle_cards
            .values()
            .filter(|card| card.battle_id == battle_id)
            .cloned()
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_player(&self, skill_level: SkillLevel) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.players.insert(
            id,
            PlayerAccount {
                id,
                skill_level,
                charlie_points: Decimal::ZERO,
                moon_pot_points: Decimal::ZERO,
                total_wins: 0,
                total_losses: 0,
            },
        );
        id
    }

    pub async fn add_card(&self, owner_id: i64, power_level: i32, stake_value: i64) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.cards.insert(
            id,
            Card {
                id,
                owner_id,
                name: format!("card-{}", id),
                rarity: "common".to_string(),
                power_level,
                stake_value,
                locked: false,
            },
        );
        id
    }

    pub async fn set_fail_credits(&self, fail: bool) {
        self.state.lock().await.fail_credits = fail;
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl BattleRepository for MemoryRepository {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn get_battle(&self, battle_id: i64) -> Result<Option<Battle>> {
        Ok(self.state.lock().await.battles.get(&battle_id).cloned())
    }

    async fn get_battle_cards(&self, battle_id: i64) -> Result<Vec<BattleCard>> {
        Ok(self.state.lock().await.cards_of_battle(battle_id))
    }

    async fn list_player_battles(
        &self,
        player_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Battle>, i64)> {
        let state = self.state.lock().await;
        let mut battles: Vec<Battle> = state
            .battles
            .values()
            .filter(|battle| battle.is_participant(player_id))
            .cloned()
            .collect();
        battles.sort_by(|a, b| b.id.cmp(&a.id));
        let total = battles.len() as i64;
        let page = battles
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn open_battles(&self, query: &OpenBattleQuery, limit: i64) -> Result<Vec<Battle>> {
        let state = self.state.lock().await;
        Ok(state
            .battles
            .values()
            .filter(|battle| {
                battle.status == BattleStatus::Pending
                    && battle.player2_id.is_none()
                    && battle.battle_style == query.battle_style
                    && battle.card_count == query.card_count
                    && query.skill_level.map_or(true, |level| {
                        state
                            .players
                            .get(&battle.player1_id)
                            .is_some_and(|player| player.skill_level == level)
                    })
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BattleStore for MemoryTx {
    async fn lock_battle(&mut self, battle_id: i64) -> Result<Option<Battle>> {
        Ok(self.working.battles.get(&battle_id).cloned())
    }

    async fn insert_battle(&mut self, battle: NewBattle) -> Result<Battle> {
        let now = Utc::now();
        let id = self.working.next_id();
        let battle = Battle {
            id,
            player1_id: battle.player1_id,
            player2_id: None,
            winner_id: None,
            battle_type: battle.battle_type,
            battle_style: battle.battle_style,
            card_count: battle.card_count,
            total_pot: battle.total_pot,
            status: BattleStatus::Pending,
            is_risk_mode: battle.is_risk_mode,
            tournament_id: battle.tournament_id,
            created_at: now,
            updated_at: now,
        };
        self.working.battles.insert(id, battle.clone());
        Ok(battle)
    }

    async fn update_battle(&mut self, battle: &Battle) -> Result<()> {
        let mut updated = battle.clone();
        updated.updated_at = Utc::now();
        self.working.battles.insert(battle.id, updated);
        Ok(())
    }

    async fn insert_battle_cards(&mut self, cards: Vec<NewBattleCard>) -> Result<Vec<BattleCard>> {
        let mut inserted = Vec::with_capacity(cards.len());
        for card in cards {
            let id = self.working.next_id();
            let battle_card = BattleCard {
                id,
                battle_id: card.battle_id,
                card_id: card.card_id,
                player_id: card.player_id,
                round_number: card.round_number,
                power_level: card.power_level,
                stake_value: card.stake_value,
                boosters: None,
                result: RoundResult::Pending,
                damage_dealt: Decimal::ZERO,
                damage_received: Decimal::ZERO,
            };
            self.working.battle_cards.insert(id, battle_card.clone());
            inserted.push(battle_card);
        }
        Ok(inserted)
    }

    async fn battle_cards(&mut self, battle_id: i64) -> Result<Vec<BattleCard>> {
        Ok(self.working.cards_of_battle(battle_id))
    }

    async fn update_battle_card(&mut self, card: &BattleCard) -> Result<()> {
        self.working.battle_cards.insert(card.id, card.clone());
        Ok(())
    }
}

#[async_trait]
impl CardStore for MemoryTx {
    async fn lock_cards(&mut self, card_ids: &[i64], owner_id: i64) -> Result<Vec<Card>> {
        let available: Vec<Card> = self
            .working
            .cards
            .values()
            .filter(|card| card_ids.contains(&card.id))
            .filter(|card| card.owner_id == owner_id && !card.locked)
            .cloned()
            .collect();
        let mut cards = order_by_selection(card_ids, available).ok_or_else(|| {
            AppError::InvalidCardSelection(
                "cards must exist, belong to you and not be locked".to_string(),
            )
        })?;
        for card in cards.iter_mut() {
            card.locked = true;
            self.working.cards.insert(card.id, card.clone());
        }
        Ok(cards)
    }

    async fn unlock_cards(&mut self, card_ids: &[i64]) -> Result<()> {
        for id in card_ids {
            if let Some(card) = self.working.cards.get_mut(id) {
                card.locked = false;
            }
        }
        Ok(())
    }

    async fn delete_cards(&mut self, card_ids: &[i64]) -> Result<()> {
        for id in card_ids {
            self.working.cards.remove(id);
        }
        Ok(())
    }
}

impl MemoryTx {
    fn credit(
        &mut self,
        account: &'static str,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()> {
        if self.working.fail_credits {
            return Err(AppError::Internal("ledger unavailable".to_string()));
        }
        let duplicate = self.working.ledger.iter().any(|entry| {
            entry.battle_id == battle_id && entry.player_id == player_id && entry.account == account
        });
        if duplicate {
            return Err(AppError::Internal(format!(
                "battle {} already credited {} to player {}",
                battle_id, account, player_id
            )));
        }
        let player = self
            .working
            .players
            .get_mut(&player_id)
            .ok_or_else(|| AppError::NotFound(format!("Player {} not found", player_id)))?;
        match account {
            "balance" => player.charlie_points += amount,
            _ => player.moon_pot_points += amount,
        }
        self.working.ledger.push(LedgerEntry {
            player_id,
            battle_id,
            account,
            amount,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl StakeLedger for MemoryTx {
    async fn credit_balance(
        &mut self,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()> {
        self.credit("balance", player_id, amount, reason, battle_id)
    }

    async fn credit_moon_pot(
        &mut self,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()> {
        self.credit("moon_pot", player_id, amount, reason, battle_id)
    }

    async fn record_outcome(&mut self, winner_id: i64, loser_id: i64) -> Result<()> {
        if let Some(winner) = self.working.players.get_mut(&winner_id) {
            winner.total_wins += 1;
        }
        if let Some(loser) = self.working.players.get_mut(&loser_id) {
            loser.total_losses += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl BattleTx for MemoryTx {
    async fn commit(self) -> Result<()> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
