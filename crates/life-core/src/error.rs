//! Error types for the simulation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid dimension: {rows}x{cols} (rows and cols must be positive)")]
    InvalidDimension { rows: i32, cols: i32 },

    #[error("Engine not ready: no grid has been built")]
    EngineNotReady,

    #[error("Cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: i32,
        col: i32,
        rows: usize,
        cols: usize,
    },

    #[error("Life cycle is already running")]
    AlreadyRunning,

    #[error("Life cycle is not active")]
    CycleNotActive,

    #[error("Life cycle tick panicked: {0}")]
    TickPanicked(String),

    #[error("World cannot be replaced while an edit batch is being announced")]
    EditInProgress,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
