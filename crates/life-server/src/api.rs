//! API handlers for the server.

use crate::ws::ServerMessage;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use life_core::CellChange;
use life_world::{LifeCycle, SimulationEngine, Snapshot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SimulationEngine>,
    pub updates: broadcast::Sender<ServerMessage>,
    cycle: Arc<Mutex<Option<LifeCycle>>>,
}

impl AppState {
    pub fn new(engine: Arc<SimulationEngine>, updates: broadcast::Sender<ServerMessage>) -> Self {
        Self {
            engine,
            updates,
            cycle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the engine's life cycle and keep its handle
    pub fn start_cycle(&self, interval: Option<Duration>) -> life_core::Result<()> {
        let cycle = match interval {
            Some(interval) => self.engine.start_with_interval(interval)?,
            None => self.engine.start()?,
        };
        self.cycle.lock().replace(cycle);
        Ok(())
    }

    /// Push the current board to every connected client and return it
    pub fn broadcast_snapshot(&self) -> life_core::Result<Snapshot> {
        let snapshot = self.engine.export_snapshot()?;
        let _ = self.updates.send(ServerMessage::WorldSnapshot {
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Stop the life cycle and wait for its task to finish
    pub async fn shutdown(&self) {
        self.engine.stop();
        let cycle = self.cycle.lock().take();
        if let Some(cycle) = cycle {
            let outcome = cycle.join().await;
            info!(?outcome, "Life cycle finished");
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    running: bool,
    generation: Option<u64>,
}

impl StatusResponse {
    fn of(engine: &SimulationEngine) -> Self {
        Self {
            running: engine.is_running(),
            generation: engine.generation(),
        }
    }
}

/// Current world snapshot
pub async fn get_world(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(state.engine.export_snapshot()?))
}

/// Life cycle status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::of(&state.engine))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    rows: i32,
    cols: i32,
    #[serde(default)]
    initial_alive: bool,
}

/// Replace the world with a fresh grid
pub async fn build_world(
    State(state): State<AppState>,
    Json(req): Json<BuildRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    info!("Build requested: {}x{}", req.rows, req.cols);

    state.engine.build(req.rows, req.cols, req.initial_alive)?;
    Ok(Json(state.broadcast_snapshot()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RandomizeRequest {
    seed: Option<u64>,
}

/// Fill the world with random cells
pub async fn randomize_world(
    State(state): State<AppState>,
    req: Option<Json<RandomizeRequest>>,
) -> Result<Json<Snapshot>, ApiError> {
    let req = req.map(|Json(req)| req).unwrap_or_default();

    match req.seed {
        Some(seed) => state.engine.randomize_seeded(seed)?,
        None => state.engine.randomize()?,
    }

    Ok(Json(state.broadcast_snapshot()?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    interval_ms: Option<u64>,
}

/// Start the life cycle
pub async fn start_cycle(
    State(state): State<AppState>,
    req: Option<Json<StartRequest>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let req = req.map(|Json(req)| req).unwrap_or_default();

    state.start_cycle(req.interval_ms.map(Duration::from_millis))?;

    Ok(Json(StatusResponse::of(&state.engine)))
}

/// Stop the life cycle
pub async fn stop_cycle(State(state): State<AppState>) -> Json<StatusResponse> {
    state.engine.stop();
    Json(StatusResponse::of(&state.engine))
}

/// Apply a batch of cell edits
pub async fn apply_edits(
    State(state): State<AppState>,
    Json(changes): Json<Vec<CellChange>>,
) -> Result<StatusCode, ApiError> {
    state.engine.apply_edits(&changes)?;
    Ok(StatusCode::NO_CONTENT)
}

// Error handling
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

impl From<life_core::Error> for ApiError {
    fn from(err: life_core::Error) -> Self {
        use life_core::Error;

        let message = err.to_string();
        match err {
            Error::EngineNotReady => ApiError::NotFound(message),
            Error::AlreadyRunning | Error::CycleNotActive | Error::EditInProgress => {
                warn!("Life cycle conflict: {}", message);
                ApiError::Conflict(message)
            }
            Error::InvalidDimension { .. }
            | Error::OutOfBounds { .. }
            | Error::InvalidConfig(_) => ApiError::BadRequest(message),
            Error::Serialization(_) => {
                error!("Core error: {}", message);
                ApiError::BadRequest(message)
            }
            Error::TickPanicked(_) => {
                error!("Core error: {}", message);
                ApiError::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use life_core::EngineConfig;

    fn state() -> AppState {
        let engine = Arc::new(SimulationEngine::new(EngineConfig::new(5, 5, 100)).unwrap());
        let (updates, _) = broadcast::channel(16);
        AppState::new(engine, updates)
    }

    #[test]
    fn test_error_mapping() {
        use life_core::Error;

        assert!(matches!(
            ApiError::from(Error::EngineNotReady),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(Error::AlreadyRunning),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(Error::InvalidDimension { rows: 0, cols: 1 }),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(Error::EditInProgress),
            ApiError::Conflict(_)
        ));
        assert_eq!(
            ApiError::from(Error::TickPanicked("boom".to_string()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let response = ApiError::Conflict("busy".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_world_not_built() {
        let state = state();
        let err = get_world(State(state)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_build_and_edit() {
        let state = state();
        let mut updates = state.updates.subscribe();

        let Json(snapshot) = build_world(
            State(state.clone()),
            Json(BuildRequest {
                rows: 4,
                cols: 6,
                initial_alive: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!((snapshot.rows, snapshot.cols), (4, 6));
        assert!(matches!(
            updates.recv().await.unwrap(),
            ServerMessage::WorldSnapshot { .. }
        ));

        let status = apply_edits(State(state.clone()), Json(vec![CellChange::new(3, 5, true)]))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = apply_edits(State(state.clone()), Json(vec![CellChange::new(4, 0, true)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let Json(snapshot) = get_world(State(state)).await.unwrap();
        assert_eq!(snapshot.grid.live_cells(), vec![(3, 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let state = state();
        state.engine.build(5, 5, false).unwrap();

        let Json(status) = start_cycle(State(state.clone()), None).await.unwrap();
        assert_eq!(
            status,
            StatusResponse {
                running: true,
                generation: Some(1)
            }
        );

        let err = start_cycle(State(state.clone()), None).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let Json(status) = stop_cycle(State(state.clone())).await;
        assert!(!status.running);

        state.shutdown().await;
    }
}
