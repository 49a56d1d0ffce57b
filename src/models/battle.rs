use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::str::FromStr;

use crate::error::{AppError, Result};

/// Declares a unit enum persisted as lowercase text.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AppError::Internal(format!(
                        "unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a battle. `Completed` and `Cancelled` are terminal.
    BattleStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(BattleStyle {
    Funny => "funny",
    Hardcore => "hardcore",
});

text_enum!(BattleType {
    Pvp => "pvp",
    Pve => "pve",
    Tournament => "tournament",
});

text_enum!(RoundResult {
    Pending => "pending",
    Win => "win",
    Loss => "loss",
});

text_enum!(SkillLevel {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
    Expert => "expert",
});

impl SkillLevel {
    pub fn all() -> [SkillLevel; 4] {
        [
            Self::Beginner,
            Self::Intermediate,
            Self::Advanced,
            Self::Expert,
        ]
    }
}

/// A one-round power modifier. `multiplier` is a percentage, 100 is neutral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booster {
    #[serde(rename = "type")]
    pub booster_type: String,
    pub multiplier: Decimal,
}

// ==================== BATTLE ====================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    pub id: i64,
    pub player1_id: i64,
    pub player2_id: Option<i64>,
    pub winner_id: Option<i64>,
    pub battle_type: BattleType,
    pub battle_style: BattleStyle,
    pub card_count: i32,
    pub total_pot: i64,
    pub status: BattleStatus,
    pub is_risk_mode: bool,
    pub tournament_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Battle {
    pub fn is_participant(&self, player_id: i64) -> bool {
        self.player1_id == player_id || self.player2_id == Some(player_id)
    }

    pub fn opponent_of(&self, player_id: i64) -> Option<i64> {
        if self.player1_id == player_id {
            self.player2_id
        } else if self.player2_id == Some(player_id) {
            Some(self.player1_id)
        } else {
            None
        }
    }

    /// Wins needed to take the battle: `ceil(card_count / 2)`.
    pub fn required_wins(&self) -> usize {
        (self.card_count.max(0) as usize + 1) / 2
    }

    pub fn ensure_joinable(&self, joiner_id: i64) -> Result<()> {
        if self.status != BattleStatus::Pending {
            return Err(AppError::BattleNotJoinable(format!(
                "battle is {}",
                self.status
            )));
        }
        if self.player2_id.is_some() {
            return Err(AppError::BattleNotJoinable(
                "battle already has a second player".to_string(),
            ));
        }
        if self.player1_id == joiner_id {
            return Err(AppError::BattleNotJoinable(
                "cannot join your own battle".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BattleRow {
    pub id: i64,
    pub player1_id: i64,
    pub player2_id: Option<i64>,
    pub winner_id: Option<i64>,
    pub battle_type: String,
    pub battle_style: String,
    pub card_count: i32,
    pub total_pot: i64,
    pub status: String,
    pub is_risk_mode: bool,
    pub tournament_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BattleRow> for Battle {
    type Error = AppError;

    fn try_from(row: BattleRow) -> Result<Self> {
        Ok(Battle {
            id: row.id,
            player1_id: row.player1_id,
            player2_id: row.player2_id,
            winner_id: row.winner_id,
            battle_type: row.battle_type.parse()?,
            battle_style: row.battle_style.parse()?,
            card_count: row.card_count,
            total_pot: row.total_pot,
            status: row.status.parse()?,
            is_risk_mode: row.is_risk_mode,
            tournament_id: row.tournament_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewBattle {
    pub player1_id: i64,
    pub battle_type: BattleType,
    pub battle_style: BattleStyle,
    pub card_count: i32,
    pub total_pot: i64,
    pub is_risk_mode: bool,
    pub tournament_id: Option<i64>,
}

// ==================== BATTLE CARD ====================
/// One staked card bound to one round. `card_id` is a weak reference: the card row
/// may be gone after a risk-mode loss while this history row remains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleCard {
    pub id: i64,
    pub battle_id: i64,
    pub card_id: i64,
    pub player_id: i64,
    pub round_number: i32,
    pub power_level: i32,
    pub stake_value: i64,
    pub boosters: Option<Vec<Booster>>,
    pub result: RoundResult,
    pub damage_dealt: Decimal,
    pub damage_received: Decimal,
}

impl BattleCard {
    pub fn has_played(&self) -> bool {
        self.boosters.is_some() || self.result != RoundResult::Pending
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BattleCardRow {
    pub id: i64,
    pub battle_id: i64,
    pub card_id: i64,
    pub player_id: i64,
    pub round_number: i32,
    pub power_level: i32,
    pub stake_value: i64,
    pub boosters: Option<Json<Vec<Booster>>>,
    pub result: String,
    pub damage_dealt: Decimal,
    pub damage_received: Decimal,
}

impl TryFrom<BattleCardRow> for BattleCard {
    type Error = AppError;

    fn try_from(row: BattleCardRow) -> Result<Self> {
        Ok(BattleCard {
            id: row.id,
            battle_id: row.battle_id,
            card_id: row.card_id,
            player_id: row.player_id,
            round_number: row.round_number,
            power_level: row.power_level,
            stake_value: row.stake_value,
            boosters: row.boosters.map(|json| json.0),
            result: row.result.parse()?,
            damage_dealt: row.damage_dealt,
            damage_received: row.damage_received,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewBattleCard {
    pub battle_id: i64,
    pub card_id: i64,
    pub player_id: i64,
    pub round_number: i32,
    pub power_level: i32,
    pub stake_value: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BattleDetails {
    pub battle: Battle,
    pub cards: Vec<BattleCard>,
}

// ==================== MATCHMAKING ====================
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenBattleQuery {
    pub battle_style: BattleStyle,
    pub card_count: i32,
    pub skill_level: Option<SkillLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickMatch {
    pub battle: Option<Battle>,
    pub found_match: bool,
    pub queue_size: usize,
}

// ==================== RECONNECT VIEW ====================
#[derive(Debug, Clone, Serialize)]
pub struct RoundSideView {
    pub player_id: i64,
    pub card_id: i64,
    pub power_level: i32,
    pub boosters_used: Option<Vec<Booster>>,
    pub damage_dealt: Decimal,
    pub result: RoundResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub round_number: i32,
    pub status: RoundResult,
    pub player1: Option<RoundSideView>,
    pub player2: Option<RoundSideView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BattleStateView {
    pub battle: Battle,
    pub current_round: i32,
    pub total_rounds: i32,
    pub rounds: Vec<RoundView>,
}

impl From<&BattleCard> for RoundSideView {
    fn from(card: &BattleCard) -> Self {
        RoundSideView {
            player_id: card.player_id,
            card_id: card.card_id,
            power_level: card.power_level,
            boosters_used: card.boosters.clone(),
            damage_dealt: card.damage_dealt,
            result: card.result,
        }
    }
}

impl BattleStateView {
    /// `current_round` is the lowest round still pending, or `card_count + 1` once
    /// every round has resolved.
    pub fn build(battle: Battle, cards: &[BattleCard]) -> Self {
        let total_rounds = battle.card_count;
        let current_round = cards
            .iter()
            .filter(|card| card.result == RoundResult::Pending)
            .map(|card| card.round_number)
            .min()
            .unwrap_or(total_rounds + 1);

        let rounds = (1..=total_rounds)
            .map(|round_number| {
                let side = |player_id: Option<i64>| {
                    cards
                        .iter()
                        .find(|card| {
                            Some(card.player_id) == player_id && card.round_number == round_number
                        })
                        .map(RoundSideView::from)
                };
                let player1 = side(Some(battle.player1_id));
                let player2 = side(battle.player2_id);
                let status = player1
                    .as_ref()
                    .map(|view| view.result)
                    .unwrap_or(RoundResult::Pending);
                RoundView {
                    round_number,
                    status,
                    player1,
                    player2,
                }
            })
            .collect();

        BattleStateView {
            battle,
            current_round,
            total_rounds,
            rounds,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_battle(card_count: i32) -> Battle {
    let now = Utc::now();
    Battle {
        id: 1,
        player1_id: 10,
        player2_id: None,
        winner_id: None,
        battle_type: BattleType::Pvp,
        battle_style: BattleStyle::Funny,
        card_count,
        total_pot: 0,
        status: BattleStatus::Pending,
        is_risk_mode: false,
        tournament_id: None,
        created_at: now,
        updated_at: now,
    }
}
