use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    oracle::{Counterexample, EquivalenceOracle, Hypothesis, MembershipOracle},
    word::all_words,
};

/// An equivalence test that explores every word whose length lies between a minimum and a
/// maximum depth. Words are tried by ascending length and lexicographically within each length,
/// and the first word on which hypothesis and system disagree is returned.
#[derive(Debug, Clone)]
pub struct CompleteExploration<M> {
    oracle: M,
    min_depth: usize,
    max_depth: usize,
    batch_size: usize,
}

impl<M: MembershipOracle> CompleteExploration<M> {
    /// Explores all words of length `1..=max_depth`.
    pub fn new(oracle: M, max_depth: usize) -> Self {
        Self::with_depths(oracle, 1, max_depth)
    }

    /// Explores all words whose length lies between the two depths. If `min_depth` exceeds
    /// `max_depth`, the two are swapped.
    pub fn with_depths(oracle: M, min_depth: usize, max_depth: usize) -> Self {
        Self {
            oracle,
            min_depth: min_depth.min(max_depth),
            max_depth: min_depth.max(max_depth),
            batch_size: 1,
        }
    }

    /// Submits words to the membership oracle in batches of the given size. Larger batches may
    /// query words beyond the first counterexample, but the returned counterexample is the same.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn depths(&self) -> (usize, usize) {
        (self.min_depth, self.max_depth)
    }

    pub fn oracle(&self) -> &M {
        &self.oracle
    }
}

impl<M: MembershipOracle> EquivalenceOracle for CompleteExploration<M> {
    type Input = M::Input;
    type Output = M::Output;
    type Error = M::Error;

    fn find_counterexample<H>(
        &self,
        hypothesis: &H,
        alphabet: &[M::Input],
    ) -> Result<Option<Counterexample<M::Input, M::Output>>, M::Error>
    where
        H: Hypothesis<M::Input, Output = M::Output>,
    {
        debug!(
            "exploring words of length {} to {} over {} symbols",
            self.min_depth,
            self.max_depth,
            alphabet.len()
        );
        let chunks = all_words(alphabet, self.min_depth, self.max_depth).chunks(self.batch_size);
        for chunk in &chunks {
            let words = chunk.collect_vec();
            let outputs = self.oracle.answer_batch(&words)?;
            for (word, output) in words.into_iter().zip(outputs) {
                if hypothesis.output(&word) != output {
                    trace!("hypothesis deviates on {word:?}");
                    return Ok(Some(Counterexample::new(word, output)));
                }
            }
        }
        Ok(None)
    }
}
