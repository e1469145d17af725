use thiserror::Error;
use tracing::trace;

use crate::{
    math,
    oracle::{Hypothesis, MembershipOracle},
    word::Symbol,
};

/// Index of a state in a [`MealyMachine`].
pub type StateIndex = usize;

/// Raised when a [`MealyMachine`] has no transition for some symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MealyError {
    #[error("no transition on {symbol} from state {state}")]
    MissingTransition { state: StateIndex, symbol: String },
}

/// A deterministic Mealy machine given by an explicit transition table. Each transition maps a
/// pair of source state and input symbol to a target state together with an output symbol.
#[derive(Debug, Clone)]
pub struct MealyMachine<I: Symbol, O: Symbol> {
    alphabet: Vec<I>,
    transitions: math::Map<(StateIndex, I), (StateIndex, O)>,
    size: usize,
    initial: StateIndex,
}

impl<I: Symbol, O: Symbol> MealyMachine<I, O> {
    /// Creates a builder, see [`MealyBuilder::with_transitions`].
    pub fn builder() -> MealyBuilder<I, O> {
        MealyBuilder::default()
    }

    /// Returns the input alphabet in the order in which symbols were first mentioned.
    pub fn alphabet(&self) -> &[I] {
        &self.alphabet
    }

    /// Returns the number of states.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn initial(&self) -> StateIndex {
        self.initial
    }

    /// Takes a single transition from `state` on `symbol`.
    pub fn step(&self, state: StateIndex, symbol: &I) -> Result<(StateIndex, &O), MealyError> {
        self.transitions
            .get(&(state, symbol.clone()))
            .map(|(target, output)| (*target, output))
            .ok_or_else(|| MealyError::MissingTransition {
                state,
                symbol: format!("{symbol:?}"),
            })
    }

    /// Runs `word` from `state` and returns the produced outputs together with the reached state.
    pub fn run_from(
        &self,
        state: StateIndex,
        word: &[I],
    ) -> Result<(Vec<O>, StateIndex), MealyError> {
        let mut current = state;
        let mut outputs = Vec::with_capacity(word.len());
        for symbol in word {
            let (target, output) = self.step(current, symbol)?;
            outputs.push(output.clone());
            current = target;
        }
        trace!("ran {word:?} from {state}, reached {current}");
        Ok((outputs, current))
    }

    /// Computes the output trace that `word` produces from the initial state.
    pub fn transform(&self, word: &[I]) -> Result<Vec<O>, MealyError> {
        self.run_from(self.initial, word).map(|(outputs, _)| outputs)
    }

    /// Generates a complete machine with `size` states over the given inputs, where each
    /// transition picks its target and output uniformly at random. State `0` is initial.
    #[cfg(feature = "random")]
    pub fn random(size: usize, inputs: &[I], outputs: &[O]) -> Self {
        assert!(size > 0, "a Mealy machine needs at least one state");
        assert!(!outputs.is_empty(), "cannot pick outputs from an empty set");
        let mut builder = Self::builder();
        for state in 0..size {
            for symbol in inputs {
                let target = fastrand::usize(..size);
                let output = outputs[fastrand::usize(..outputs.len())].clone();
                builder = builder.with_transition(state, symbol.clone(), output, target);
            }
        }
        builder.with_states(size).into_mealy(0)
    }
}

/// Incrementally collects the transitions of a [`MealyMachine`].
#[derive(Debug, Clone)]
pub struct MealyBuilder<I: Symbol, O: Symbol> {
    alphabet: Vec<I>,
    transitions: math::Map<(StateIndex, I), (StateIndex, O)>,
    size: usize,
}

impl<I: Symbol, O: Symbol> Default for MealyBuilder<I, O> {
    fn default() -> Self {
        Self {
            alphabet: vec![],
            transitions: math::Map::default(),
            size: 0,
        }
    }
}

impl<I: Symbol, O: Symbol> MealyBuilder<I, O> {
    /// Adds a transition from `source` on `input` that emits `output` and moves to `target`.
    /// A later transition with the same source and input replaces the earlier one.
    pub fn with_transition(
        mut self,
        source: StateIndex,
        input: I,
        output: O,
        target: StateIndex,
    ) -> Self {
        if !self.alphabet.contains(&input) {
            self.alphabet.push(input.clone());
        }
        self.size = self.size.max(source + 1).max(target + 1);
        self.transitions.insert((source, input), (target, output));
        self
    }

    /// Adds all transitions given as `(source, input, output, target)` tuples.
    pub fn with_transitions<T: IntoIterator<Item = (StateIndex, I, O, StateIndex)>>(
        self,
        transitions: T,
    ) -> Self {
        transitions
            .into_iter()
            .fold(self, |builder, (source, input, output, target)| {
                builder.with_transition(source, input, output, target)
            })
    }

    /// Ensures the machine has at least `size` states, even if some have no transitions.
    pub fn with_states(mut self, size: usize) -> Self {
        self.size = self.size.max(size);
        self
    }

    /// Finishes building, designating `initial` as the initial state.
    pub fn into_mealy(self, initial: StateIndex) -> MealyMachine<I, O> {
        MealyMachine {
            alphabet: self.alphabet,
            transitions: self.transitions,
            size: self.size.max(initial + 1),
            initial,
        }
    }
}

impl<I: Symbol, O: Symbol> Hypothesis<I> for MealyMachine<I, O> {
    type Output = Vec<O>;

    fn output(&self, word: &[I]) -> Vec<O> {
        self.transform(word).expect("Hypothesis must be complete")
    }
}

impl<I: Symbol, O: Symbol> MembershipOracle for MealyMachine<I, O> {
    type Input = I;
    type Output = Vec<O>;
    type Error = MealyError;

    fn answer(&self, word: &[I]) -> Result<Vec<O>, MealyError> {
        self.transform(word)
    }
}
