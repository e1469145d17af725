use std::{convert::Infallible, fmt::Debug, marker::PhantomData};

use crate::word::Symbol;

/// A word on which a hypothesis and the system under learning disagree, together with the
/// output the system actually produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterexample<I, D> {
    pub input: Vec<I>,
    pub output: D,
}

impl<I, D> Counterexample<I, D> {
    pub fn new(input: Vec<I>, output: D) -> Self {
        Self { input, output }
    }
}

/// Answers membership queries, i.e. it executes input words and reports the observed output.
///
/// This is the surface consumed by learning algorithms and equivalence tests. Anything that
/// answers queries can sit behind it, from a plain function over words to a caching oracle that
/// talks to a real system. Batches are answered index for index: the `i`-th output belongs to
/// the `i`-th input word.
pub trait MembershipOracle {
    type Input: Symbol;
    type Output: Clone + Eq + Debug;
    type Error: std::error::Error + Send + Sync;

    /// Answers a single query.
    fn answer(&self, word: &[Self::Input]) -> Result<Self::Output, Self::Error>;

    /// Answers a batch of queries. The default implementation answers them one after another.
    fn answer_batch(&self, words: &[Vec<Self::Input>]) -> Result<Vec<Self::Output>, Self::Error> {
        words.iter().map(|word| self.answer(word)).collect()
    }
}

impl<M: MembershipOracle> MembershipOracle for &M {
    type Input = M::Input;
    type Output = M::Output;
    type Error = M::Error;

    fn answer(&self, word: &[Self::Input]) -> Result<Self::Output, Self::Error> {
        (*self).answer(word)
    }

    fn answer_batch(&self, words: &[Vec<Self::Input>]) -> Result<Vec<Self::Output>, Self::Error> {
        (*self).answer_batch(words)
    }
}

/// A hypothesis is a model that predicts the output of the system for an input word.
pub trait Hypothesis<I> {
    type Output;

    fn output(&self, word: &[I]) -> Self::Output;
}

impl<I, D, F> Hypothesis<I> for F
where
    F: Fn(&[I]) -> D,
{
    type Output = D;

    fn output(&self, word: &[I]) -> D {
        self(word)
    }
}

/// Searches for a word on which a hypothesis deviates from the system under learning.
///
/// Different search strategies implement this independently, see for example
/// [`crate::eqtests::CompleteExploration`]. `Ok(None)` means no counterexample was found within
/// whatever bounds the strategy imposes on itself.
pub trait EquivalenceOracle {
    type Input: Symbol;
    type Output;
    type Error;

    fn find_counterexample<H>(
        &self,
        hypothesis: &H,
        alphabet: &[Self::Input],
    ) -> Result<Option<Counterexample<Self::Input, Self::Output>>, Self::Error>
    where
        H: Hypothesis<Self::Input, Output = Self::Output>;
}

/// A [`MembershipOracle`] that answers queries by evaluating a function on the input word. It
/// cannot fail.
pub struct FnOracle<I, D, F> {
    f: F,
    _marker: PhantomData<fn(&[I]) -> D>,
}

impl<I, D, F> FnOracle<I, D, F>
where
    F: Fn(&[I]) -> D,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<I, D, F> MembershipOracle for FnOracle<I, D, F>
where
    I: Symbol,
    D: Clone + Eq + Debug,
    F: Fn(&[I]) -> D,
{
    type Input = I;
    type Output = D;
    type Error = Infallible;

    fn answer(&self, word: &[I]) -> Result<D, Infallible> {
        Ok((self.f)(word))
    }
}
