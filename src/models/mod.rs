// src/models/mod.rs
pub mod battle;
pub mod card;
pub mod event;

use serde::Serialize;

pub use battle::{
    Battle, BattleCard, BattleCardRow, BattleDetails, BattleRow, BattleStateView, BattleStatus,
    BattleStyle, BattleType, Booster, NewBattle, NewBattleCard, OpenBattleQuery, QuickMatch,
    RoundResult, SkillLevel,
};
pub use card::Card;
pub use event::{BattleEvent, RoundSide};

// ==================== API ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: i32,
    pub limit: i32,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success_sets_flag() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, "ok");
    }
}
