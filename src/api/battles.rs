use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use super::{enforce_rate_limit, require_player, AppState, BattleAction};
use crate::{
    error::Result,
    models::{
        ApiResponse, Battle, BattleDetails, BattleStateView, Booster, OpenBattleQuery,
        PaginatedResponse, QuickMatch,
    },
    services::battle_engine::{CreateBattle, PlayRoundOutcome},
    utils::page_window,
};

// ==================== REQUEST TYPES ====================

#[derive(Debug, Deserialize)]
pub struct ListBattlesQuery {
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct JoinBattleRequest {
    pub card_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRoundRequest {
    pub round_number: i32,
    pub boosters_used: Option<Vec<Booster>>,
}

// ==================== HANDLERS ====================

/// GET /api/v1/battles
pub async fn list_battles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListBattlesQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<Battle>>>> {
    let player_id = require_player(&headers, &state).await?;
    let (page, limit, offset) = page_window(query.page, query.limit);
    let (items, total) = state
        .engine
        .list_battles(player_id, limit as i64, offset)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        page,
        limit,
        total,
    })))
}

/// POST /api/v1/battles
pub async fn create_battle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBattle>,
) -> Result<(StatusCode, Json<ApiResponse<Battle>>)> {
    let player_id = require_player(&headers, &state).await?;
    enforce_rate_limit(&state, player_id, BattleAction::Create).await?;
    let battle = state.engine.create_battle(player_id, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(battle))))
}

/// GET /api/v1/battles/quick-match
pub async fn quick_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OpenBattleQuery>,
) -> Result<Json<ApiResponse<QuickMatch>>> {
    let player_id = require_player(&headers, &state).await?;
    let result = state.engine.quick_match(player_id, query).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/v1/battles/{battle_id}
pub async fn get_battle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(battle_id): Path<i64>,
) -> Result<Json<ApiResponse<BattleDetails>>> {
    require_player(&headers, &state).await?;
    let details = state.engine.get_battle_details(battle_id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// GET /api/v1/battles/{battle_id}/state
pub async fn get_battle_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(battle_id): Path<i64>,
) -> Result<Json<ApiResponse<BattleStateView>>> {
    let player_id = require_player(&headers, &state).await?;
    let view = state.engine.battle_state(battle_id, player_id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// POST /api/v1/battles/{battle_id}/join
pub async fn join_battle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(battle_id): Path<i64>,
    Json(req): Json<JoinBattleRequest>,
) -> Result<Json<ApiResponse<Battle>>> {
    let player_id = require_player(&headers, &state).await?;
    enforce_rate_limit(&state, player_id, BattleAction::Join).await?;
    let battle = state
        .engine
        .join_battle(battle_id, player_id, req.card_ids)
        .await?;
    Ok(Json(ApiResponse::success(battle)))
}

/// POST /api/v1/battles/{battle_id}/rounds
pub async fn play_round(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(battle_id): Path<i64>,
    Json(req): Json<PlayRoundRequest>,
) -> Result<Json<ApiResponse<PlayRoundOutcome>>> {
    let player_id = require_player(&headers, &state).await?;
    enforce_rate_limit(&state, player_id, BattleAction::Play).await?;
    let outcome = state
        .engine
        .play_round(
            battle_id,
            player_id,
            req.round_number,
            req.boosters_used.unwrap_or_default(),
        )
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/battles/{battle_id}/cancel
pub async fn cancel_battle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(battle_id): Path<i64>,
) -> Result<Json<ApiResponse<Battle>>> {
    let player_id = require_player(&headers, &state).await?;
    enforce_rate_limit(&state, player_id, BattleAction::Cancel).await?;
    let battle = state.engine.cancel_battle(battle_id, player_id).await?;
    Ok(Json(ApiResponse::success(battle)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_round_request_accepts_missing_boosters() {
        let req: PlayRoundRequest = serde_json::from_str(r#"{"round_number":2}"#).unwrap();
        assert_eq!(req.round_number, 2);
        assert!(req.boosters_used.is_none());

        let req: PlayRoundRequest = serde_json::from_str(
            r#"{"round_number":1,"boosters_used":[{"type":"shield","multiplier":120}]}"#,
        )
        .unwrap();
        assert_eq!(req.boosters_used.map(|b| b.len()), Some(1));
    }

    #[test]
    fn create_request_defaults_to_pvp_without_risk() {
        let req: CreateBattle = serde_json::from_str(
            r#"{"card_ids":[1,2,3],"battle_style":"hardcore","card_count":3}"#,
        )
        .unwrap();
        assert_eq!(req.battle_type, crate::models::BattleType::Pvp);
        assert!(!req.is_risk_mode);
        assert!(req.tournament_id.is_none());
    }
}
