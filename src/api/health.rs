use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub redis: String,
}

fn connection_label(connected: bool) -> String {
    if connected { "connected" } else { "disconnected" }.to_string()
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = state.db.pool().acquire().await.is_ok();

    let mut conn = state.redis.clone();
    let redis_connected = redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .is_ok();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: connection_label(db_connected),
        redis: connection_label(redis_connected),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_label_matches_state() {
        assert_eq!(connection_label(true), "connected");
        assert_eq!(connection_label(false), "disconnected");
    }
}
