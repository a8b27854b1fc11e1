//! WebSocket push channel and the bridge from engine events to it.

use crate::api::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use life_core::CellChange;
use life_world::{EngineEvent, SimulationEngine, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, instrument, warn};

/// Messages pushed to connected clients, tagged by event name
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerMessage {
    WorldSnapshot { snapshot: Snapshot },
    NextGenerationBuilt { snapshot: Snapshot },
    WorldDied { snapshot: Snapshot },
    WorldChange { changes: Vec<CellChange> },
    LoopStoppedWithError { error: String },
}

/// Requests a client may send over the socket
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientMessage {
    Edit { edits: Vec<CellChange> },
    Randomize,
    Start,
    Stop,
}

/// Forward every engine notification into `updates`.
///
/// Generation events carry a fresh snapshot. With `stop_on_extinction` the
/// engine's life cycle is stopped as soon as the world dies.
pub fn bridge_events(
    engine: &Arc<SimulationEngine>,
    updates: broadcast::Sender<ServerMessage>,
    stop_on_extinction: bool,
) {
    let weak: Weak<SimulationEngine> = Arc::downgrade(engine);

    engine.events().subscribe_all(move |event| {
        let Some(engine) = weak.upgrade() else {
            return;
        };

        let message = match event {
            EngineEvent::NextGenerationBuilt => match engine.export_snapshot() {
                Ok(snapshot) => ServerMessage::NextGenerationBuilt { snapshot },
                Err(e) => {
                    warn!("Snapshot after new generation failed: {}", e);
                    return;
                }
            },
            EngineEvent::WorldDied => {
                if stop_on_extinction {
                    info!("World died, stopping life cycle");
                    engine.stop();
                }
                match engine.export_snapshot() {
                    Ok(snapshot) => ServerMessage::WorldDied { snapshot },
                    Err(e) => {
                        warn!("Snapshot after extinction failed: {}", e);
                        return;
                    }
                }
            }
            EngineEvent::WorldChange(changes) => ServerMessage::WorldChange {
                changes: changes.clone(),
            },
            EngineEvent::LoopStoppedWithError(err) => ServerMessage::LoopStoppedWithError {
                error: err.to_string(),
            },
        };

        // No receivers just means no client is connected
        let _ = updates.send(message);
    });
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip_all)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("Client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.updates.subscribe();

    if let Ok(snapshot) = state.engine.export_snapshot() {
        if let Ok(text) = serde_json::to_string(&ServerMessage::WorldSnapshot { snapshot }) {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let message = match updates.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, skipped {} updates", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode update: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_client_message(&recv_state, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Client disconnected");
}

fn handle_client_message(state: &AppState, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed client message: {}", e);
            return;
        }
    };

    debug!(?message, "Client message");

    let result = match message {
        ClientMessage::Edit { edits } => state.engine.apply_edits(&edits),
        ClientMessage::Randomize => state
            .engine
            .randomize()
            .and_then(|()| state.broadcast_snapshot().map(|_| ())),
        ClientMessage::Start => state.start_cycle(None),
        ClientMessage::Stop => {
            state.engine.stop();
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Client request failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use life_core::EngineConfig;
    use std::time::Duration;

    #[test]
    fn test_client_message_parsing() {
        let message: ClientMessage = serde_json::from_str(
            r#"{ "action": "edit", "edits": [{ "row": 1, "col": 2, "alive": true }] }"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::Edit {
                edits: vec![CellChange::new(1, 2, true)]
            }
        );

        let message: ClientMessage = serde_json::from_str(r#"{ "action": "stop" }"#).unwrap();
        assert_eq!(message, ClientMessage::Stop);
    }

    #[test]
    fn test_server_message_tags() {
        let json = serde_json::to_value(ServerMessage::LoopStoppedWithError {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "loop-stopped-with-error", "error": "boom" })
        );

        let json = serde_json::to_value(ServerMessage::WorldChange {
            changes: vec![CellChange::new(0, 0, true)],
        })
        .unwrap();
        assert_eq!(json["event"], "world-change");
        assert_eq!(json["changes"][0]["alive"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_stops_on_extinction() {
        let engine = Arc::new(SimulationEngine::new(EngineConfig::new(4, 4, 100)).unwrap());
        engine.build(4, 4, false).unwrap();

        let (updates, mut rx) = broadcast::channel(16);
        bridge_events(&engine, updates, true);

        let cycle = engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        match rx.recv().await.unwrap() {
            ServerMessage::WorldDied { snapshot } => assert_eq!(snapshot.generation, 2),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(!engine.is_running());
        cycle.join().await;
    }

    #[tokio::test]
    async fn test_bridge_forwards_edits() {
        let engine = Arc::new(SimulationEngine::new(EngineConfig::default()).unwrap());
        engine.build(3, 3, false).unwrap();

        let (updates, mut rx) = broadcast::channel(16);
        bridge_events(&engine, updates, false);

        engine.apply_edits(&[CellChange::new(1, 1, true)]).unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::WorldChange { changes } => {
                assert_eq!(changes, vec![CellChange::new(1, 1, true)])
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_client_message_drives_engine() {
        let engine = Arc::new(SimulationEngine::new(EngineConfig::default()).unwrap());
        engine.build(3, 3, false).unwrap();
        let (updates, _) = broadcast::channel(16);
        let state = AppState::new(engine.clone(), updates);

        handle_client_message(
            &state,
            r#"{ "action": "edit", "edits": [{ "row": 2, "col": 0, "alive": true }] }"#,
        );
        handle_client_message(&state, "not json");

        let snapshot = engine.export_snapshot().unwrap();
        assert_eq!(snapshot.grid.live_cells(), vec![(2, 0)]);
    }

    #[test]
    fn test_randomize_over_socket_pushes_snapshot() {
        let engine = Arc::new(SimulationEngine::new(EngineConfig::default()).unwrap());
        engine.build(4, 4, false).unwrap();
        let (updates, mut rx) = broadcast::channel(16);
        let state = AppState::new(engine.clone(), updates);

        handle_client_message(&state, r#"{ "action": "randomize" }"#);

        match rx.try_recv().unwrap() {
            ServerMessage::WorldSnapshot { snapshot } => {
                assert_eq!(snapshot, engine.export_snapshot().unwrap());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
