use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ==================== CARD ====================
/// A collectible card. `locked` is set while the card is staked in a battle or
/// listed on the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub rarity: String,
    pub power_level: i32,
    pub stake_value: i64,
    pub locked: bool,
}
