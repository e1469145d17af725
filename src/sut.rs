//! The contract between the reuse machinery and the system under test (SUT).
//!
//! The only place where actual communication with the system under test happens is an
//! implementation of [`ReuseCapable`]. It offers two operations: running a query after a reset and
//! continuing a query from a previously saved system state. Saved states are represented by
//! [`StateHandle`]s, which are owned by exactly one party at a time and must be released
//! explicitly.

use crate::word::Symbol;

mod simulator;
pub use simulator::{MealySimulator, SimulatorError, SimulatorState};

/// An opaque handle to a live state of the system under test.
///
/// Handles are never cloned. Whoever owns a handle is responsible for either passing it on (for
/// example to [`ReuseCapable::continue_from`]) or calling [`StateHandle::release`], which consumes
/// it and frees whatever resource backs it.
pub trait StateHandle: Send + Sync {
    fn release(self);
}

/// The result of executing a query against the system under test: the outputs produced for the
/// executed inputs and, optionally, a handle to the state the system ended up in. A missing
/// handle means the adapter does not offer to resume from that state.
#[derive(Debug)]
pub struct QueryResult<O, H> {
    pub output: Vec<O>,
    pub state: Option<H>,
}

impl<O, H> QueryResult<O, H> {
    pub fn new(output: Vec<O>, state: Option<H>) -> Self {
        Self { output, state }
    }
}

/// An adapter to a system under test that can save and resume system states.
///
/// Both operations must produce exactly one output per input symbol. Results that violate this are
/// rejected by the [`crate::reuse::ReuseOracle`] and their state is released. If an operation
/// fails, the error is reported as is and the adapter keeps responsibility for any handle that was
/// passed in.
pub trait ReuseCapable {
    type Input: Symbol;
    type Output: Symbol;
    type Handle: StateHandle;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resets the system, executes `word` and reports the outputs.
    fn run_from_scratch(
        &self,
        word: &[Self::Input],
    ) -> Result<QueryResult<Self::Output, Self::Handle>, Self::Error>;

    /// Resumes the system from `state` and executes `suffix`. The returned outputs cover only the
    /// suffix.
    fn continue_from(
        &self,
        state: Self::Handle,
        suffix: &[Self::Input],
    ) -> Result<QueryResult<Self::Output, Self::Handle>, Self::Error>;
}
