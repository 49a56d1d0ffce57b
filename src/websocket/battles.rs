use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, timeout, Duration};

use crate::{
    api::{auth::extract_player_from_token, AppState},
    constants::{WS_CLIENT_TIMEOUT_SECS, WS_HEARTBEAT_INTERVAL_SECS},
    error::{AppError, Result},
    models::BattleEvent,
};

#[derive(Debug, Deserialize)]
pub struct BattleStreamQuery {
    pub token: String,
}

fn connected_payload(battle_id: i64, player_id: i64) -> String {
    serde_json::json!({
        "type": "connected",
        "battle_id": battle_id,
        "player_id": player_id,
    })
    .to_string()
}

/// GET /ws/battles/{battle_id}?token=...
///
/// Streams the battle's events plus the caller's personal events. Only the two
/// participants may subscribe.
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(battle_id): Path<i64>,
    Query(query): Query<BattleStreamQuery>,
) -> Result<Response> {
    let player_id = extract_player_from_token(&query.token, &state.config.jwt_secret)?;
    let details = state.engine.get_battle_details(battle_id).await?;
    if !details.battle.is_participant(player_id) {
        return Err(AppError::Forbidden(
            "You are not a participant in this battle".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, battle_id, player_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, battle_id: i64, player_id: i64) {
    let (mut sender, mut receiver) = socket.split();

    let mut battle_rx = state.notifications.subscribe_battle(battle_id).await;
    let mut player_rx = state.notifications.subscribe_player(player_id).await;

    let _ = sender
        .send(Message::Text(connected_payload(battle_id, player_id).into()))
        .await;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval(Duration::from_secs(WS_HEARTBEAT_INTERVAL_SECS));

        loop {
            let event = tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    continue;
                }
                result = battle_rx.recv() => result,
                result = player_rx.recv() => match result {
                    // Battle events already arrive on the battle channel.
                    Ok(event) if event.battle_id() == battle_id => continue,
                    other => other,
                },
            };

            match next_frame(event) {
                Some(Ok(json)) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!("Dropping unserializable battle event: {}", err);
                }
                None => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        loop {
            let next_msg =
                timeout(Duration::from_secs(WS_CLIENT_TIMEOUT_SECS), receiver.next()).await;
            let msg = match next_msg {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {
                    tracing::info!("Battle stream client timeout");
                    break;
                }
            };

            match msg {
                Message::Close(_) => break,
                Message::Text(text) => tracing::debug!("Ignoring client message: {}", text),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            // the subscriptions live in the send task
            let _ = (&mut send_task).await;
        }
    }

    state.notifications.prune_battle(battle_id).await;
    state.notifications.prune_player(player_id).await;
    tracing::info!(
        "Battle stream closed for player {} on battle {}",
        player_id,
        battle_id
    );
}

/// `None` ends the stream. A lagging receiver skips what it missed.
fn next_frame(
    event: std::result::Result<BattleEvent, RecvError>,
) -> Option<serde_json::Result<String>> {
    match event {
        Ok(event) => Some(serde_json::to_string(&event)),
        Err(RecvError::Lagged(skipped)) => Some(Ok(serde_json::json!({
            "type": "lagged",
            "skipped": skipped,
        })
        .to_string())),
        Err(RecvError::Closed) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn connected_payload_has_type() {
        let payload = connected_payload(3, 7);
        assert!(payload.contains("\"type\":\"connected\""));
        assert!(payload.contains("\"battle_id\":3"));
    }

    #[test]
    fn lagged_receiver_gets_notice_and_closed_ends_stream() {
        let frame = next_frame(Err(RecvError::Lagged(4)))
            .expect("frame")
            .expect("json");
        assert!(frame.contains("\"skipped\":4"));
        assert!(next_frame(Err(RecvError::Closed)).is_none());

        let event = BattleEvent::BattleCancelled {
            battle_id: 1,
            player1_id: 2,
            timestamp: Utc::now(),
        };
        let frame = next_frame(Ok(event)).expect("frame").expect("json");
        assert!(frame.contains("battle_cancelled"));
    }
}
