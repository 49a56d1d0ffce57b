use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::battle::{Battle, BattleCard, BattleStyle};

/// Snapshot of one side of a round, as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundCard {
    pub player_id: i64,
    pub battle_card_id: i64,
    pub card_id: i64,
    pub power_level: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSide {
    pub player_id: i64,
    pub battle_card_id: i64,
    pub damage_dealt: Decimal,
    pub damage_received: Decimal,
}

impl From<&BattleCard> for RoundCard {
    fn from(card: &BattleCard) -> Self {
        RoundCard {
            player_id: card.player_id,
            battle_card_id: card.id,
            card_id: card.card_id,
            power_level: card.power_level,
        }
    }
}

impl From<&BattleCard> for RoundSide {
    fn from(card: &BattleCard) -> Self {
        RoundSide {
            player_id: card.player_id,
            battle_card_id: card.id,
            damage_dealt: card.damage_dealt,
            damage_received: card.damage_received,
        }
    }
}

/// Lifecycle events produced by the battle engine after a transition commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BattleEvent {
    BattleCreated {
        battle_id: i64,
        player1_id: i64,
        battle_style: BattleStyle,
        card_count: i32,
        total_pot: i64,
        is_risk_mode: bool,
        timestamp: DateTime<Utc>,
    },
    BattleJoined {
        battle_id: i64,
        player1_id: i64,
        player2_id: i64,
        total_pot: i64,
        timestamp: DateTime<Utc>,
    },
    RoundStarted {
        battle_id: i64,
        round_number: i32,
        player1: Option<RoundCard>,
        player2: Option<RoundCard>,
        timestamp: DateTime<Utc>,
    },
    RoundResolved {
        battle_id: i64,
        round_number: i32,
        winner_id: i64,
        player1: RoundSide,
        player2: RoundSide,
        timestamp: DateTime<Utc>,
    },
    BattleCompleted {
        battle_id: i64,
        winner_id: i64,
        loser_id: i64,
        total_pot: i64,
        winner_points: Decimal,
        moon_pot_points: Decimal,
        cards_destroyed: usize,
        player_ids: [i64; 2],
        timestamp: DateTime<Utc>,
    },
    BattleCancelled {
        battle_id: i64,
        player1_id: i64,
        timestamp: DateTime<Utc>,
    },
}

impl BattleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BattleCreated { .. } => "battle.created",
            Self::BattleJoined { .. } => "battle.joined",
            Self::RoundStarted { .. } => "battle.round_started",
            Self::RoundResolved { .. } => "battle.round_resolved",
            Self::BattleCompleted { .. } => "battle.completed",
            Self::BattleCancelled { .. } => "battle.cancelled",
        }
    }

    pub fn battle_id(&self) -> i64 {
        match self {
            Self::BattleCreated { battle_id, .. }
            | Self::BattleJoined { battle_id, .. }
            | Self::RoundStarted { battle_id, .. }
            | Self::RoundResolved { battle_id, .. }
            | Self::BattleCompleted { battle_id, .. }
            | Self::BattleCancelled { battle_id, .. } => *battle_id,
        }
    }

    /// Players that get the event on their personal channel, on top of the battle channel.
    pub fn player_recipients(&self) -> Vec<i64> {
        match self {
            Self::BattleJoined { player1_id, .. } => vec![*player1_id],
            Self::BattleCompleted { player_ids, .. } => player_ids.to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn created(battle: &Battle) -> Self {
        Self::BattleCreated {
            battle_id: battle.id,
            player1_id: battle.player1_id,
            battle_style: battle.battle_style,
            card_count: battle.card_count,
            total_pot: battle.total_pot,
            is_risk_mode: battle.is_risk_mode,
            timestamp: Utc::now(),
        }
    }

    pub fn round_started(battle: &Battle, round_number: i32, cards: &[BattleCard]) -> Self {
        let side = |player_id: Option<i64>| {
            cards
                .iter()
                .find(|card| Some(card.player_id) == player_id && card.round_number == round_number)
                .map(RoundCard::from)
        };
        Self::RoundStarted {
            battle_id: battle.id,
            round_number,
            player1: side(Some(battle.player1_id)),
            player2: side(battle.player2_id),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = BattleEvent::BattleCancelled {
            battle_id: 4,
            player1_id: 9,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "battle_cancelled");
        assert_eq!(json["battle_id"], 4);
        assert_eq!(event.kind(), "battle.cancelled");
    }

    #[test]
    fn completed_event_targets_both_players() {
        let event = BattleEvent::BattleCompleted {
            battle_id: 1,
            winner_id: 2,
            loser_id: 3,
            total_pot: 10,
            winner_points: Decimal::from(5),
            moon_pot_points: Decimal::from(5),
            cards_destroyed: 0,
            player_ids: [2, 3],
            timestamp: Utc::now(),
        };
        assert_eq!(event.player_recipients(), vec![2, 3]);
        assert_eq!(event.battle_id(), 1);
    }
}
