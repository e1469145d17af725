use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex, RwLock,
};

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::{QueryResult, ReuseCapable, StateHandle};
use crate::{
    math,
    mealy::{MealyError, MealyMachine, StateIndex},
    word::Symbol,
};

/// Failures reported by a [`MealySimulator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Machine(#[from] MealyError),
    #[error("lost connection to the simulated system")]
    ConnectionLost,
}

/// Keeps track of every state handle the simulator has handed out, so that leaks and double
/// releases become observable.
#[derive(Debug, Default)]
struct Ledger {
    next: AtomicU64,
    live: Mutex<math::Set<u64>>,
    released: AtomicUsize,
    double_released: AtomicUsize,
}

impl Ledger {
    fn issue(&self) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.live.lock().expect("ledger poisoned").insert(id);
        id
    }

    fn retire(&self, id: u64) -> bool {
        self.live.lock().expect("ledger poisoned").remove(&id)
    }

    fn release(&self, id: u64) {
        if self.retire(id) {
            self.released.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!("state handle {id} released twice");
            self.double_released.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A saved state of a [`MealySimulator`].
#[derive(Debug)]
pub struct SimulatorState {
    id: u64,
    state: StateIndex,
    ledger: Arc<Ledger>,
}

impl SimulatorState {
    /// The state of the simulated machine this handle refers to.
    pub fn state(&self) -> StateIndex {
        self.state
    }
}

impl StateHandle for SimulatorState {
    fn release(self) {
        trace!("releasing simulator state {} ({})", self.id, self.state);
        self.ledger.release(self.id);
    }
}

/// A system under test that simulates a [`MealyMachine`].
///
/// Besides answering queries, the simulator counts resets and executed input symbols, which is
/// what reuse is supposed to save, and records the fate of every state handle. For testing it can
/// be told to fail the next operation or to switch to a different machine, which makes it appear
/// nondeterministic.
#[derive(Debug)]
pub struct MealySimulator<I: Symbol, O: Symbol> {
    machine: RwLock<Arc<MealyMachine<I, O>>>,
    ledger: Arc<Ledger>,
    resets: AtomicUsize,
    steps: AtomicUsize,
    fail_next: AtomicBool,
    offer_states: bool,
}

impl<I: Symbol, O: Symbol> MealySimulator<I, O> {
    pub fn new(machine: MealyMachine<I, O>) -> Self {
        Self {
            machine: RwLock::new(Arc::new(machine)),
            ledger: Arc::new(Ledger::default()),
            resets: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            offer_states: true,
        }
    }

    /// Makes the simulator decline to hand out state handles, every result carries `None`.
    pub fn without_states(mut self) -> Self {
        self.offer_states = false;
        self
    }

    /// Replaces the simulated machine. Handles issued before remain valid and are interpreted as
    /// states of the new machine.
    pub fn replace_machine(&self, machine: MealyMachine<I, O>) {
        debug!("simulator switches to a machine with {} states", machine.size());
        *self.machine.write().expect("simulator poisoned") = Arc::new(machine);
    }

    /// Lets the next call to either operation fail with [`SimulatorError::ConnectionLost`].
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of resets, i.e. queries that were run from scratch.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    /// Number of input symbols that were executed in total.
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::Relaxed)
    }

    /// Number of handles that were handed out and have neither been released nor consumed.
    pub fn live_states(&self) -> usize {
        self.ledger.live.lock().expect("ledger poisoned").len()
    }

    /// Number of handles that were released explicitly.
    pub fn released_states(&self) -> usize {
        self.ledger.released.load(Ordering::Relaxed)
    }

    /// Number of release calls for handles that were already released or consumed.
    pub fn double_releases(&self) -> usize {
        self.ledger.double_released.load(Ordering::Relaxed)
    }

    fn machine(&self) -> Arc<MealyMachine<I, O>> {
        Arc::clone(&self.machine.read().expect("simulator poisoned"))
    }

    fn check_connection(&self) -> Result<(), SimulatorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            warn!("simulated connection failure");
            return Err(SimulatorError::ConnectionLost);
        }
        Ok(())
    }

    fn execute(
        &self,
        from: StateIndex,
        word: &[I],
    ) -> Result<QueryResult<O, SimulatorState>, SimulatorError> {
        let (output, reached) = self.machine().run_from(from, word)?;
        self.steps.fetch_add(word.len(), Ordering::Relaxed);
        let state = self.offer_states.then(|| SimulatorState {
            id: self.ledger.issue(),
            state: reached,
            ledger: Arc::clone(&self.ledger),
        });
        Ok(QueryResult::new(output, state))
    }
}

impl<I: Symbol, O: Symbol> ReuseCapable for MealySimulator<I, O> {
    type Input = I;
    type Output = O;
    type Handle = SimulatorState;
    type Error = SimulatorError;

    fn run_from_scratch(
        &self,
        word: &[I],
    ) -> Result<QueryResult<O, SimulatorState>, SimulatorError> {
        self.check_connection()?;
        self.resets.fetch_add(1, Ordering::Relaxed);
        let initial = self.machine().initial();
        self.execute(initial, word)
    }

    fn continue_from(
        &self,
        state: SimulatorState,
        suffix: &[I],
    ) -> Result<QueryResult<O, SimulatorState>, SimulatorError> {
        let consumed = self.ledger.retire(state.id);
        assert!(consumed, "state handle {} was used after it was spent", state.id);
        self.check_connection()?;
        self.execute(state.state, suffix)
    }
}
