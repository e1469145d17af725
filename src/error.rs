use std::fmt::{Debug, Display};

use thiserror::Error;

/// Two observations of the same input prefix that ended in different outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict<I, O> {
    /// The input prefix whose last symbol produced differing outputs.
    pub prefix: Vec<I>,
    /// The output that was recorded earlier.
    pub recorded: O,
    /// The output that was observed just now.
    pub observed: O,
}

impl<I, O> Conflict<I, O> {
    pub fn new(prefix: Vec<I>, recorded: O, observed: O) -> Self {
        Self {
            prefix,
            recorded,
            observed,
        }
    }
}

impl<I: Debug, O: Debug> Display for Conflict<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} previously produced {:?} but now produced {:?}",
            self.prefix, self.recorded, self.observed
        )
    }
}

/// Errors returned by a [`crate::reuse::ReuseOracle`].
#[derive(Debug, Error)]
pub enum ReuseError<E, I: Debug, O: Debug> {
    /// The system under test failed, the error is passed on untouched.
    #[error(transparent)]
    Sut(E),
    /// The system under test did not produce exactly one output per input symbol.
    #[error("system under test produced {actual} outputs for {expected} inputs")]
    OutputLength { expected: usize, actual: usize },
    /// The system behaved nondeterministically and the oracle is configured to treat this as an
    /// error.
    #[error("system under test is nondeterministic: {0}")]
    Nondeterminism(Conflict<I, O>),
}

impl<E, I: Debug, O: Debug> ReuseError<E, I, O> {
    pub fn is_nondeterminism(&self) -> bool {
        matches!(self, ReuseError::Nondeterminism(_))
    }
}
