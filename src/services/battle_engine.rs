//! Battle lifecycle: create, join, round play, completion with payout, cancel.
//!
//! Each transition runs in one repository transaction that starts by locking the
//! battle row. Events are collected while the transaction is open and published
//! only after it commits.

use chrono::Utc;
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use super::{
    matchmaking::MatchmakingIndex,
    notification_service::NotificationSink,
    round_resolver::{resolve_round, validate_boosters, RoundWinner},
};
use crate::{
    constants::{
        ALLOWED_CARD_COUNTS, POT_SPLIT_DIVISOR, REASON_BATTLE_MOON_POT, REASON_BATTLE_WIN,
    },
    error::{AppError, Result},
    models::*,
    store::{BattleRepository, BattleStore, BattleTx, CardStore, StakeLedger},
};

fn default_battle_type() -> BattleType {
    BattleType::Pvp
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBattle {
    pub card_ids: Vec<i64>,
    #[serde(default = "default_battle_type")]
    pub battle_type: BattleType,
    pub battle_style: BattleStyle,
    pub card_count: i32,
    #[serde(default)]
    pub is_risk_mode: bool,
    pub tournament_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayRoundOutcome {
    pub battle_id: i64,
    pub round_number: i32,
    pub round_complete: bool,
    pub waiting_for_opponent: bool,
    pub card: BattleCard,
    pub battle_status: BattleStatus,
    pub winner_id: Option<i64>,
}

/// What a completion transition paid out and destroyed.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub winner_id: i64,
    pub loser_id: i64,
    pub winner_points: Decimal,
    pub moon_pot_points: Decimal,
    pub cards_destroyed: usize,
}

impl Settlement {
    fn event(&self, battle: &Battle) -> BattleEvent {
        BattleEvent::BattleCompleted {
            battle_id: battle.id,
            winner_id: self.winner_id,
            loser_id: self.loser_id,
            total_pot: battle.total_pot,
            winner_points: self.winner_points,
            moon_pot_points: self.moon_pot_points,
            cards_destroyed: self.cards_destroyed,
            player_ids: [self.winner_id, self.loser_id],
            timestamp: Utc::now(),
        }
    }
}

pub struct BattleEngine<R: BattleRepository> {
    repo: R,
    matchmaking: Arc<dyn MatchmakingIndex>,
    notifier: Arc<dyn NotificationSink>,
    rng: Mutex<StdRng>,
    candidate_limit: i64,
}

impl<R: BattleRepository> BattleEngine<R> {
    pub fn new(
        repo: R,
        matchmaking: Arc<dyn MatchmakingIndex>,
        notifier: Arc<dyn NotificationSink>,
        candidate_limit: i64,
    ) -> Self {
        Self::with_rng(
            repo,
            matchmaking,
            notifier,
            candidate_limit,
            StdRng::from_os_rng(),
        )
    }

    pub fn with_rng(
        repo: R,
        matchmaking: Arc<dyn MatchmakingIndex>,
        notifier: Arc<dyn NotificationSink>,
        candidate_limit: i64,
        rng: StdRng,
    ) -> Self {
        Self {
            repo,
            matchmaking,
            notifier,
            rng: Mutex::new(rng),
            candidate_limit,
        }
    }

    // ==================== TRANSITIONS ====================

    pub async fn create_battle(&self, player_id: i64, request: CreateBattle) -> Result<Battle> {
        if !ALLOWED_CARD_COUNTS.contains(&request.card_count) {
            return Err(AppError::BadRequest(format!(
                "card_count must be one of {:?}",
                ALLOWED_CARD_COUNTS
            )));
        }
        if request.battle_type == BattleType::Tournament && request.tournament_id.is_none() {
            return Err(AppError::BadRequest(
                "tournament battles need a tournament_id".to_string(),
            ));
        }
        if request.card_ids.len() != request.card_count as usize {
            return Err(AppError::InvalidCardSelection(format!(
                "expected {} cards, got {}",
                request.card_count,
                request.card_ids.len()
            )));
        }
        ensure_distinct(&request.card_ids)?;

        let mut tx = self.repo.begin().await?;
        let cards = tx.lock_cards(&request.card_ids, player_id).await?;
        let battle = tx
            .insert_battle(NewBattle {
                player1_id: player_id,
                battle_type: request.battle_type,
                battle_style: request.battle_style,
                card_count: request.card_count,
                total_pot: stake_sum(&cards),
                is_risk_mode: request.is_risk_mode,
                tournament_id: request.tournament_id,
            })
            .await?;
        tx.insert_battle_cards(new_battle_cards(&battle, player_id, &cards))
            .await?;
        tx.commit().await?;

        tracing::info!(
            "Battle {} created by player {} ({} x{}, pot {})",
            battle.id,
            player_id,
            battle.battle_style,
            battle.card_count,
            battle.total_pot
        );

        self.invalidate_matchmaking(battle.battle_style, battle.card_count)
            .await;
        self.publish(vec![BattleEvent::created(&battle)]).await;
        Ok(battle)
    }

    pub async fn join_battle(
        &self,
        battle_id: i64,
        player_id: i64,
        card_ids: Vec<i64>,
    ) -> Result<Battle> {
        let mut tx = self.repo.begin().await?;
        let mut battle = tx
            .lock_battle(battle_id)
            .await?
            .ok_or_else(|| battle_not_found(battle_id))?;

        battle.ensure_joinable(player_id)?;
        if card_ids.len() != battle.card_count as usize {
            return Err(AppError::CardCountMismatch {
                expected: battle.card_count,
                actual: card_ids.len(),
            });
        }
        ensure_distinct(&card_ids)?;

        let cards = tx.lock_cards(&card_ids, player_id).await?;
        battle.total_pot += stake_sum(&cards);
        battle.player2_id = Some(player_id);
        battle.status = BattleStatus::InProgress;
        tx.update_battle(&battle).await?;
        tx.insert_battle_cards(new_battle_cards(&battle, player_id, &cards))
            .await?;
        let all_cards = tx.battle_cards(battle_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Player {} joined battle {} (pot {})",
            player_id,
            battle_id,
            battle.total_pot
        );

        if let Err(err) = self.matchmaking.flush().await {
            tracing::warn!("Matchmaking flush after join failed: {}", err);
        }
        self.publish(vec![
            BattleEvent::BattleJoined {
                battle_id,
                player1_id: battle.player1_id,
                player2_id: player_id,
                total_pot: battle.total_pot,
                timestamp: Utc::now(),
            },
            BattleEvent::round_started(&battle, 1, &all_cards),
        ])
        .await;
        Ok(battle)
    }

    /// Records the player's boosters for a round and resolves it when the opponent
    /// has already played. Never waits for the opponent.
    pub async fn play_round(
        &self,
        battle_id: i64,
        player_id: i64,
        round_number: i32,
        boosters: Vec<Booster>,
    ) -> Result<PlayRoundOutcome> {
        validate_boosters(&boosters)?;

        let mut tx = self.repo.begin().await?;
        let mut battle = tx
            .lock_battle(battle_id)
            .await?
            .ok_or_else(|| battle_not_found(battle_id))?;

        if !battle.is_participant(player_id) {
            return Err(AppError::Forbidden(
                "You are not a participant in this battle".to_string(),
            ));
        }
        if battle.status != BattleStatus::InProgress {
            return Err(AppError::BattleNotActive);
        }
        let opponent_id = battle
            .opponent_of(player_id)
            .ok_or_else(|| AppError::Internal(format!("battle {} has no opponent", battle_id)))?;

        let cards = tx.battle_cards(battle_id).await?;
        let round_card = |owner: i64| {
            cards
                .iter()
                .find(|card| card.player_id == owner && card.round_number == round_number)
                .cloned()
        };
        let mut own = round_card(player_id).ok_or_else(|| {
            AppError::BadRequest(format!("Round {} is not part of this battle", round_number))
        })?;
        if own.has_played() {
            return Err(AppError::RoundAlreadyPlayed(round_number));
        }

        let mut events = Vec::new();
        let round_complete = match round_card(opponent_id) {
            Some(mut opponent) if opponent.boosters.is_some() => {
                let outcome = {
                    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                    resolve_round(
                        own.power_level,
                        &boosters,
                        opponent.power_level,
                        opponent.boosters.as_deref().unwrap_or_default(),
                        &mut *rng,
                    )?
                };
                let own_won = outcome.winner == RoundWinner::First;

                own.boosters = Some(boosters);
                own.damage_dealt = outcome.first_power;
                own.damage_received = outcome.second_power;
                opponent.damage_dealt = outcome.second_power;
                opponent.damage_received = outcome.first_power;
                (own.result, opponent.result) = if own_won {
                    (RoundResult::Win, RoundResult::Loss)
                } else {
                    (RoundResult::Loss, RoundResult::Win)
                };
                tx.update_battle_card(&own).await?;
                tx.update_battle_card(&opponent).await?;

                let (first, second) = if own.player_id == battle.player1_id {
                    (&own, &opponent)
                } else {
                    (&opponent, &own)
                };
                events.push(BattleEvent::RoundResolved {
                    battle_id,
                    round_number,
                    winner_id: if own_won { player_id } else { opponent_id },
                    player1: RoundSide::from(first),
                    player2: RoundSide::from(second),
                    timestamp: Utc::now(),
                });
                true
            }
            _ => {
                own.boosters = Some(boosters);
                tx.update_battle_card(&own).await?;
                false
            }
        };

        if round_complete {
            match settle_locked(&mut tx, &mut battle).await? {
                Some(settlement) => events.push(settlement.event(&battle)),
                None => {
                    let next_round = round_number + 1;
                    let next_pending = cards.iter().any(|card| {
                        card.round_number == next_round && card.result == RoundResult::Pending
                    });
                    if next_pending {
                        events.push(BattleEvent::round_started(&battle, next_round, &cards));
                    }
                }
            }
        }

        tx.commit().await?;

        tracing::debug!(
            "Player {} played round {} of battle {} (complete: {})",
            player_id,
            round_number,
            battle_id,
            round_complete
        );

        self.publish(events).await;
        Ok(PlayRoundOutcome {
            battle_id,
            round_number,
            round_complete,
            waiting_for_opponent: !round_complete,
            card: own,
            battle_status: battle.status,
            winner_id: battle.winner_id,
        })
    }

    /// Runs the completion transition if the battle has a winner. Safe to call any
    /// number of times: only the call that finds the battle in progress pays out.
    pub async fn check_completion(&self, battle_id: i64) -> Result<Battle> {
        let mut tx = self.repo.begin().await?;
        let mut battle = tx
            .lock_battle(battle_id)
            .await?
            .ok_or_else(|| battle_not_found(battle_id))?;
        let settlement = settle_locked(&mut tx, &mut battle).await?;
        tx.commit().await?;

        if let Some(settlement) = settlement {
            self.publish(vec![settlement.event(&battle)]).await;
        }
        Ok(battle)
    }

    pub async fn cancel_battle(&self, battle_id: i64, player_id: i64) -> Result<Battle> {
        let mut tx = self.repo.begin().await?;
        let mut battle = tx
            .lock_battle(battle_id)
            .await?
            .ok_or_else(|| battle_not_found(battle_id))?;

        if battle.player1_id != player_id {
            return Err(AppError::Forbidden(
                "Only the battle creator can cancel it".to_string(),
            ));
        }
        if battle.status != BattleStatus::Pending || battle.player2_id.is_some() {
            return Err(AppError::BattleNotCancellable);
        }

        let card_ids: Vec<i64> = tx
            .battle_cards(battle_id)
            .await?
            .iter()
            .filter(|card| card.player_id == player_id)
            .map(|card| card.card_id)
            .collect();
        tx.unlock_cards(&card_ids).await?;

        battle.status = BattleStatus::Cancelled;
        battle.total_pot = 0;
        tx.update_battle(&battle).await?;
        tx.commit().await?;

        tracing::info!("Battle {} cancelled by player {}", battle_id, player_id);

        self.invalidate_matchmaking(battle.battle_style, battle.card_count)
            .await;
        self.publish(vec![BattleEvent::BattleCancelled {
            battle_id,
            player1_id: battle.player1_id,
            timestamp: Utc::now(),
        }])
        .await;
        Ok(battle)
    }

    // ==================== QUERIES ====================

    /// Picks a random open battle of the requested format that the requester did
    /// not create. The cache is filled from the repository on a miss; cache errors
    /// fall back to the repository.
    pub async fn quick_match(&self, player_id: i64, query: OpenBattleQuery) -> Result<QuickMatch> {
        if !ALLOWED_CARD_COUNTS.contains(&query.card_count) {
            return Err(AppError::BadRequest(format!(
                "card_count must be one of {:?}",
                ALLOWED_CARD_COUNTS
            )));
        }

        let cached = match self.matchmaking.query(&query).await {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!("Matchmaking cache read failed: {}", err);
                None
            }
        };
        let open = match cached {
            Some(battles) => {
                tracing::debug!("Matchmaking cache hit ({} candidates)", battles.len());
                battles
            }
            None => {
                tracing::debug!("Matchmaking cache miss, loading open battles");
                let battles = self.repo.open_battles(&query, self.candidate_limit).await?;
                if let Err(err) = self.matchmaking.store(&query, &battles).await {
                    tracing::warn!("Matchmaking cache write failed: {}", err);
                }
                battles
            }
        };

        let mut candidates: Vec<Battle> = open
            .into_iter()
            .filter(|battle| battle.player1_id != player_id)
            .collect();

        // A cache fill racing a join can hold battles that are no longer open.
        let mut invalidated = false;
        let battle = loop {
            let picked = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                candidates.choose(&mut *rng).map(|battle| battle.id)
            };
            let Some(picked) = picked else {
                break None;
            };
            match self.repo.get_battle(picked).await? {
                Some(current)
                    if current.status == BattleStatus::Pending
                        && current.player2_id.is_none()
                        && current.player1_id != player_id =>
                {
                    break Some(current);
                }
                _ => {
                    tracing::debug!("Dropping stale matchmaking candidate {}", picked);
                    candidates.retain(|battle| battle.id != picked);
                    if !invalidated {
                        self.invalidate_matchmaking(query.battle_style, query.card_count)
                            .await;
                        invalidated = true;
                    }
                }
            }
        };

        Ok(QuickMatch {
            found_match: battle.is_some(),
            queue_size: candidates.len(),
            battle,
        })
    }

    pub async fn get_battle_details(&self, battle_id: i64) -> Result<BattleDetails> {
        let battle = self
            .repo
            .get_battle(battle_id)
            .await?
            .ok_or_else(|| battle_not_found(battle_id))?;
        let cards = self.repo.get_battle_cards(battle_id).await?;
        Ok(BattleDetails { battle, cards })
    }

    /// Round-by-round view for a participant reconnecting to a battle.
    pub async fn battle_state(&self, battle_id: i64, player_id: i64) -> Result<BattleStateView> {
        let BattleDetails { battle, cards } = self.get_battle_details(battle_id).await?;
        if !battle.is_participant(player_id) {
            return Err(AppError::Forbidden(
                "You are not a participant in this battle".to_string(),
            ));
        }
        Ok(BattleStateView::build(battle, &cards))
    }

    pub async fn list_battles(
        &self,
        player_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Battle>, i64)> {
        self.repo
            .list_player_battles(player_id, limit, offset)
            .await
    }

    // ==================== EFFECTS ====================

    async fn invalidate_matchmaking(&self, battle_style: BattleStyle, card_count: i32) {
        if let Err(err) = self.matchmaking.invalidate(battle_style, card_count).await {
            tracing::warn!("Matchmaking invalidation failed: {}", err);
        }
    }

    async fn publish(&self, events: Vec<BattleEvent>) {
        for event in &events {
            if let Err(err) = self.notifier.publish(event).await {
                tracing::warn!(
                    "Failed to publish {} for battle {}: {}",
                    event.kind(),
                    event.battle_id(),
                    err
                );
            }
        }
    }
}

/// Completion transition on an already locked battle. Returns `None` when the
/// battle is not in progress or nobody has reached the required wins yet.
async fn settle_locked<T: BattleTx>(tx: &mut T, battle: &mut Battle) -> Result<Option<Settlement>> {
    let player2_id = match battle.player2_id {
        Some(id) if battle.status == BattleStatus::InProgress => id,
        _ => return Ok(None),
    };

    let cards = tx.battle_cards(battle.id).await?;
    let wins = |player_id: i64| {
        cards
            .iter()
            .filter(|card| card.player_id == player_id && card.result == RoundResult::Win)
            .count()
    };
    let required = battle.required_wins();
    let (winner_id, loser_id) = if wins(battle.player1_id) >= required {
        (battle.player1_id, player2_id)
    } else if wins(player2_id) >= required {
        (player2_id, battle.player1_id)
    } else {
        return Ok(None);
    };

    let half = Decimal::from(battle.total_pot) / Decimal::from(POT_SPLIT_DIVISOR);
    tx.credit_balance(winner_id, half, REASON_BATTLE_WIN, battle.id)
        .await?;
    tx.credit_moon_pot(winner_id, half, REASON_BATTLE_MOON_POT, battle.id)
        .await?;
    tx.record_outcome(winner_id, loser_id).await?;

    let (destroyed, returned): (Vec<&BattleCard>, Vec<&BattleCard>) = cards
        .iter()
        .partition(|card| battle.is_risk_mode && card.player_id == loser_id);
    let destroyed: Vec<i64> = destroyed.iter().map(|card| card.card_id).collect();
    let returned: Vec<i64> = returned.iter().map(|card| card.card_id).collect();
    if !returned.is_empty() {
        tx.unlock_cards(&returned).await?;
    }
    if !destroyed.is_empty() {
        tx.delete_cards(&destroyed).await?;
    }

    battle.winner_id = Some(winner_id);
    battle.status = BattleStatus::Completed;
    tx.update_battle(battle).await?;

    tracing::info!(
        "Battle {} won by player {} (pot {}, {} cards destroyed)",
        battle.id,
        winner_id,
        battle.total_pot,
        destroyed.len()
    );

    Ok(Some(Settlement {
        winner_id,
        loser_id,
        winner_points: half,
        moon_pot_points: half,
        cards_destroyed: destroyed.len(),
    }))
}

fn battle_not_found(battle_id: i64) -> AppError {
    AppError::NotFound(format!("Battle {} not found", battle_id))
}

fn ensure_distinct(card_ids: &[i64]) -> Result<()> {
    let mut seen = HashSet::with_capacity(card_ids.len());
    if card_ids.iter().all(|id| seen.insert(*id)) {
        Ok(())
    } else {
        Err(AppError::InvalidCardSelection(
            "the same card was selected twice".to_string(),
        ))
    }
}

fn stake_sum(cards: &[Card]) -> i64 {
    cards.iter().map(|card| card.stake_value).sum()
}

/// One battle card per selected card, rounds numbered in submission order.
fn new_battle_cards(battle: &Battle, player_id: i64, cards: &[Card]) -> Vec<NewBattleCard> {
    cards
        .iter()
        .zip(1..)
        .map(|(card, round_number)| NewBattleCard {
            battle_id: battle.id,
            card_id: card.id,
            player_id,
            round_number,
            power_level: card.power_level,
            stake_value: card.stake_value,
        })
        .collect()
}
