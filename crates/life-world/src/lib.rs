//! Toroidal Game of Life simulation engine.
//!
//! This crate holds the board, the generation rule, the observer registry and
//! the periodic life cycle that advances a board on a timer.

pub mod engine;
pub mod events;
pub mod grid;
pub mod lifecycle;

pub use engine::{SimulationEngine, Snapshot};
pub use events::{EngineEvent, EventBus, EventKind};
pub use grid::{Generation, Grid};
pub use lifecycle::{CycleOutcome, LifeCycle};
