//! Membership queries with reuse of system states.
//!
//! Active learning and conformance testing of a black box system boil down to posing many
//! membership queries: an input word is executed on the system under test (SUT) and the observed
//! outputs are reported back. Each query usually starts with a reset of the system, which can be
//! by far the most expensive part when the system is real hardware or a network service.
//!
//! This crate answers queries through a [`reuse::ReuseOracle`]. It records every executed query
//! in a [`reuse::ReuseTree`], a prefix tree whose edges carry the observed outputs and whose nodes
//! may hold saved system states. Known words are answered from the tree alone, words that extend
//! a known prefix resume from a saved state, and only the remaining queries cause a reset. The
//! tree notices when the system produces different outputs for the same inputs and stops reusing
//! states that may have been reached along a path that is no longer trustworthy.
//!
//! The system itself is hidden behind the [`sut::ReuseCapable`] trait. For experiments and tests,
//! [`sut::MealySimulator`] simulates a [`mealy::MealyMachine`]. Equivalence tests such as
//! [`eqtests::CompleteExploration`] work on top of any [`oracle::MembershipOracle`], including the
//! reuse oracle.

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use automata_reuse::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        eqtests::CompleteExploration,
        error::{Conflict, ReuseError},
        math,
        mealy::{MealyBuilder, MealyError, MealyMachine},
        oracle::{Counterexample, EquivalenceOracle, FnOracle, Hypothesis, MembershipOracle},
        reuse::{Invalidation, NodeId, ReuseConfig, ReuseOracle, ReuseStats, ReuseTree},
        sut::{
            MealySimulator, QueryResult, ReuseCapable, SimulatorError, SimulatorState,
            StateHandle,
        },
        word::{all_words, Symbol},
    };
}

/// Type aliases for the collections used throughout the crate.
pub mod math;

/// Finite words over symbols and their enumeration.
pub mod word;
pub use word::Symbol;

/// Error types.
pub mod error;

/// Surfaces for membership and equivalence queries.
pub mod oracle;

/// Explicitly given Mealy machines, used as hypotheses and as simulated systems.
pub mod mealy;

pub mod sut;

pub mod reuse;

/// Equivalence tests that search for counterexamples.
pub mod eqtests;
