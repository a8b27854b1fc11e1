//! Simulation engine owning the live board and its life cycle.

use crate::events::{EngineEvent, EventBus, EventKind};
use crate::grid::{Generation, Grid};
use crate::lifecycle::{CycleOutcome, LifeCycle};
use life_core::{CellChange, EngineConfig, Error, Result, SubscriptionId};
use parking_lot::{Mutex, ReentrantMutex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, event, info, instrument, warn, Level};

/// Value copy of the engine for renderers and transports.
///
/// Serializes as `{ tickIntervalMs, rows, cols, generation, grid }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick_interval_ms: u64,
    pub rows: usize,
    pub cols: usize,
    pub generation: u64,
    pub grid: Grid,
}

struct World {
    grid: Grid,
    generation: u64,
}

struct EngineState {
    config: EngineConfig,
    world: Option<World>,
}

struct ActiveCycle {
    id: u64,
    token: CancellationToken,
}

/// A single toroidal Game of Life board and the loop that advances it.
///
/// Grid state sits behind one mutex, so a generation swap and a batch of
/// edits never interleave. Notifications are emitted with the mutex released;
/// observers may call back into the engine.
///
/// While a `world-change` is being announced the board may be edited but not
/// replaced: `build` and `teardown` fail with [`Error::EditInProgress`] from
/// the announcing thread and wait on any other.
pub struct SimulationEngine {
    state: Mutex<EngineState>,
    edit_gate: ReentrantMutex<Cell<bool>>,
    running: AtomicBool,
    cycle: Mutex<Option<ActiveCycle>>,
    next_cycle_id: AtomicU64,
    events: EventBus,
}

impl SimulationEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            state: Mutex::new(EngineState {
                config,
                world: None,
            }),
            edit_gate: ReentrantMutex::new(Cell::new(false)),
            running: AtomicBool::new(false),
            cycle: Mutex::new(None),
            next_cycle_id: AtomicU64::new(0),
            events: EventBus::new(),
        })
    }

    pub fn config(&self) -> EngineConfig {
        self.state.lock().config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current generation, if a grid has been built
    pub fn generation(&self) -> Option<u64> {
        self.state.lock().world.as_ref().map(|world| world.generation)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    /// Replace the board with a fresh `rows x cols` grid and restart counting
    /// generations at 1.
    #[instrument(skip(self))]
    pub fn build(&self, rows: i32, cols: i32, initial_alive: bool) -> Result<()> {
        let grid = Grid::new(rows, cols, initial_alive)?;

        let gate = self.edit_gate.lock();
        if gate.get() {
            return Err(Error::EditInProgress);
        }

        let mut state = self.state.lock();
        state.config.rows = rows;
        state.config.cols = cols;
        state.world = Some(World {
            grid,
            generation: 1,
        });

        info!(rows, cols, initial_alive, "World built");
        Ok(())
    }

    /// Flip a fair coin for every cell of the current grid
    pub fn randomize(&self) -> Result<()> {
        self.randomize_with(&mut rand::thread_rng())
    }

    /// Like [`randomize`](Self::randomize), but reproducible from `seed`
    pub fn randomize_seeded(&self, seed: u64) -> Result<()> {
        self.randomize_with(&mut ChaCha8Rng::seed_from_u64(seed))
    }

    fn randomize_with<R: rand::Rng>(&self, rng: &mut R) -> Result<()> {
        let mut state = self.state.lock();
        let world = state.world.as_mut().ok_or(Error::EngineNotReady)?;
        world.grid.randomize(rng);

        debug!(
            generation = world.generation,
            population = world.grid.population(),
            "World randomized"
        );
        Ok(())
    }

    /// Compute the generation after the current grid without applying it
    pub fn step(&self) -> Result<Generation> {
        let state = self.state.lock();
        let world = state.world.as_ref().ok_or(Error::EngineNotReady)?;
        Ok(world.grid.next_generation())
    }

    /// Advance the live board by one generation and notify observers.
    ///
    /// Only valid while the life cycle is running.
    pub fn advance_generation(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::CycleNotActive);
        }

        let (extinct, generation, population) = {
            let mut state = self.state.lock();
            let world = state.world.as_mut().ok_or(Error::EngineNotReady)?;
            let next = world.grid.next_generation();

            world.grid = next.grid;
            world.generation += 1;
            (next.extinct, world.generation, world.grid.population())
        };

        debug!(generation, population, extinct, "Generation advanced");
        event!(
            Level::DEBUG,
            gauge_name = "population",
            gauge_value = population,
            generation = generation,
            "Population gauge"
        );

        if extinct {
            info!(generation, "World died");
            self.events.emit(&EngineEvent::WorldDied);
        } else {
            self.events.emit(&EngineEvent::NextGenerationBuilt);
        }

        Ok(())
    }

    /// Start the life cycle with the configured tick interval
    pub fn start(self: &Arc<Self>) -> Result<LifeCycle> {
        let interval = Duration::from_millis(self.config().tick_interval_ms);
        self.start_with_interval(interval)
    }

    /// Start the life cycle, advancing one generation every `interval`.
    ///
    /// Fails with [`Error::AlreadyRunning`] if a cycle is active; the active
    /// cycle is left alone. Must be called from within a tokio runtime.
    #[instrument(skip(self))]
    pub fn start_with_interval(self: &Arc<Self>, interval: Duration) -> Result<LifeCycle> {
        if interval.is_zero() {
            return Err(Error::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        if self.state.lock().world.is_none() {
            return Err(Error::EngineNotReady);
        }

        let mut cycle = self.cycle.lock();
        if cycle.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let id = self.next_cycle_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        *cycle = Some(ActiveCycle {
            id,
            token: token.clone(),
        });
        self.running.store(true, Ordering::SeqCst);
        drop(cycle);

        info!(cycle = id, interval_ms = interval.as_millis() as u64, "Starting life cycle");

        let ticker = Arc::clone(self);
        let finisher = Arc::clone(self);
        let tick_token = token.clone();
        Ok(LifeCycle::spawn(
            interval,
            token,
            move || ticker.advance_for(&tick_token),
            move |outcome| finisher.finish_cycle(id, outcome),
        ))
    }

    /// Advance on behalf of the cycle owning `token`. A cancelled cycle never
    /// advances, even when a later cycle has set `running` again.
    fn advance_for(&self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::CycleNotActive);
        }
        self.advance_generation()
    }

    /// Ask the life cycle to stop. Safe to call when nothing is running.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let mut cycle = self.cycle.lock();
        self.running.store(false, Ordering::SeqCst);

        if let Some(active) = cycle.take() {
            active.token.cancel();
            info!(cycle = active.id, "Stopping life cycle");
        }
    }

    fn finish_cycle(&self, id: u64, outcome: CycleOutcome) -> CycleOutcome {
        let was_active = {
            let mut cycle = self.cycle.lock();
            if cycle.as_ref().is_some_and(|active| active.id == id) {
                *cycle = None;
                self.running.store(false, Ordering::SeqCst);
                true
            } else {
                false
            }
        };

        match outcome {
            CycleOutcome::Failed(err) if was_active => {
                warn!(cycle = id, error = %err, "Life cycle stopped with error");
                self.events
                    .emit(&EngineEvent::LoopStoppedWithError(err.clone()));
                CycleOutcome::Failed(err)
            }
            CycleOutcome::Failed(err) => {
                // Lost a race with stop(); the cycle was already unwanted
                debug!(cycle = id, error = %err, "Life cycle stopped");
                CycleOutcome::Cancelled
            }
            CycleOutcome::Aborted(message) if was_active => {
                warn!(cycle = id, panic = %message, "Life cycle aborted");
                self.events.emit(&EngineEvent::LoopStoppedWithError(
                    Error::TickPanicked(message.clone()),
                ));
                CycleOutcome::Aborted(message)
            }
            outcome => {
                debug!(cycle = id, "Life cycle stopped");
                outcome
            }
        }
    }

    /// Apply a batch of user edits to the live board.
    ///
    /// The whole batch is checked first; if any change is off the board
    /// nothing is applied and nothing is emitted. Otherwise observers get a
    /// `world-change` with the raw batch before it lands. The board cannot be
    /// rebuilt or torn down in between, so an announced batch always lands.
    #[instrument(skip(self, changes), fields(count = changes.len()))]
    pub fn apply_edits(&self, changes: &[CellChange]) -> Result<()> {
        let gate = self.edit_gate.lock();
        {
            let state = self.state.lock();
            let world = state.world.as_ref().ok_or(Error::EngineNotReady)?;
            world.grid.validate(changes)?;
        }

        {
            let _announcing = Announcing::new(&gate);
            self.events.emit(&EngineEvent::WorldChange(changes.to_vec()));
        }

        let mut state = self.state.lock();
        let world = state.world.as_mut().ok_or(Error::EngineNotReady)?;
        world.grid.apply(changes)?;

        debug!(generation = world.generation, "Edits applied");
        Ok(())
    }

    /// Copy out the config and current state
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let state = self.state.lock();
        let world = state.world.as_ref().ok_or(Error::EngineNotReady)?;

        Ok(Snapshot {
            tick_interval_ms: state.config.tick_interval_ms,
            rows: world.grid.rows(),
            cols: world.grid.cols(),
            generation: world.generation,
            grid: world.grid.clone(),
        })
    }

    /// Drop the board without stopping the life cycle. A running cycle fails
    /// on its next tick and reports `loop-stopped-with-error`.
    #[instrument(skip(self))]
    pub fn teardown(&self) -> Result<()> {
        let gate = self.edit_gate.lock();
        if gate.get() {
            return Err(Error::EditInProgress);
        }

        self.state.lock().world = None;
        info!("World torn down");
        Ok(())
    }
}

/// Marks a `world-change` announcement in flight. The previous mark comes
/// back on drop, including when an observer panics, so nested batches from
/// an observer keep the outer one protected.
struct Announcing<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> Announcing<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for Announcing<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("config", &self.config())
            .field("generation", &self.generation())
            .field("running", &self.is_running())
            .finish()
    }
}
