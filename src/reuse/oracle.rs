use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use super::{ReuseConfig, ReuseLookup, ReuseTree};
use crate::{
    error::ReuseError,
    oracle::MembershipOracle,
    sut::{ReuseCapable, StateHandle},
};

type Tree<S> =
    ReuseTree<<S as ReuseCapable>::Input, <S as ReuseCapable>::Output, <S as ReuseCapable>::Handle>;
type Error<S> =
    ReuseError<<S as ReuseCapable>::Error, <S as ReuseCapable>::Input, <S as ReuseCapable>::Output>;
type Answer<S> = Result<Vec<<S as ReuseCapable>::Output>, Error<S>>;

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicUsize,
    cache_hits: AtomicUsize,
    continued: AtomicUsize,
    full_runs: AtomicUsize,
    symbols_saved: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// A snapshot of what a [`ReuseOracle`] has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReuseStats {
    /// Queries posed to the oracle.
    pub queries: usize,
    /// Queries answered from recorded outputs alone.
    pub cache_hits: usize,
    /// Queries that resumed a saved state.
    pub continued: usize,
    /// Queries that were run from scratch, i.e. that needed a reset.
    pub full_runs: usize,
    /// Input symbols that did not have to be executed thanks to the tree.
    pub symbols_saved: usize,
    /// Conflicting observations, i.e. instances of nondeterminism.
    pub nondeterminism: usize,
    /// States evicted because of the capacity bound or on request.
    pub evictions: usize,
    /// States released by the tree.
    pub released: usize,
    /// States currently saved.
    pub cached_states: usize,
    /// Nodes of the tree, including the root.
    pub nodes: usize,
}

/// A membership oracle that answers queries against a [`ReuseCapable`] system and avoids resets
/// wherever it can by reusing saved system states.
///
/// The oracle owns its [`ReuseTree`] behind a reader-writer lock. Looking up recorded outputs only
/// needs shared access, while taking a state out of the tree and recording a trace need exclusive
/// access. The system under test is never called while the lock is held, and a state is taken
/// out of the tree before the lock is given up, so no two queries ever resume the same state.
pub struct ReuseOracle<S: ReuseCapable> {
    sut: S,
    tree: RwLock<Tree<S>>,
    config: ReuseConfig<S::Output>,
    counters: Counters,
}

impl<S: ReuseCapable> ReuseOracle<S> {
    /// Creates an oracle with the default [`ReuseConfig`].
    pub fn new(sut: S) -> Self {
        Self::with_config(sut, ReuseConfig::default())
    }

    pub fn with_config(sut: S, config: ReuseConfig<S::Output>) -> Self {
        Self {
            sut,
            tree: RwLock::new(ReuseTree::new()),
            config,
            counters: Counters::default(),
        }
    }

    pub fn sut(&self) -> &S {
        &self.sut
    }

    pub fn config(&self) -> &ReuseConfig<S::Output> {
        &self.config
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, Tree<S>> {
        self.tree.read().expect("reuse tree lock poisoned")
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, Tree<S>> {
        self.tree.write().expect("reuse tree lock poisoned")
    }

    /// Gives read access to the tree, e.g. for inspecting which states are saved.
    pub fn inspect<R>(&self, f: impl FnOnce(&Tree<S>) -> R) -> R {
        f(&self.read_tree())
    }

    /// Answers a single query.
    ///
    /// If the outputs for the whole word are recorded, they are returned without touching the
    /// system. Otherwise the query is resumed from the deepest saved state along the known prefix
    /// or, if there is none, run from scratch. The observed trace is recorded afterwards. A failure
    /// of the system is returned as [`ReuseError::Sut`], a result with the wrong number of outputs
    /// as [`ReuseError::OutputLength`]; both leave the tree untouched.
    pub fn answer(&self, word: &[S::Input]) -> Answer<S> {
        Counters::bump(&self.counters.queries, 1);
        if !self.config.cache_enabled {
            return self.pass_through(word);
        }

        let known = self.read_tree().peek(word);
        if known.matched() == word.len() {
            trace!("answering {word:?} from the tree");
            return Ok(self.hit(known.outputs));
        }

        let (known, resume) = match known.resume {
            Some(_) => {
                let ReuseLookup {
                    outputs, resume, ..
                } = self.write_tree().lookup(word);
                if outputs.len() == word.len() {
                    // recorded by a concurrent query in the meantime
                    return Ok(self.hit(outputs));
                }
                (outputs, resume)
            }
            None => (known.outputs, None),
        };

        let (outputs, state) = match resume {
            Some((depth, handle)) => {
                debug!("resuming {word:?} after {depth} symbols");
                Counters::bump(&self.counters.continued, 1);
                Counters::bump(&self.counters.symbols_saved, depth);
                let result = self
                    .sut
                    .continue_from(handle, &word[depth..])
                    .map_err(ReuseError::Sut)?;
                let mut outputs = known;
                outputs.truncate(depth);
                outputs.extend(result.output);
                (outputs, result.state)
            }
            None => {
                debug!("running {word:?} from scratch");
                Counters::bump(&self.counters.full_runs, 1);
                let result = self.sut.run_from_scratch(word).map_err(ReuseError::Sut)?;
                (result.output, result.state)
            }
        };
        let state = check_output_length(word.len(), outputs.len(), state)?;

        let report = self
            .write_tree()
            .record_trace(word, &outputs, state, &self.config);
        if self.config.escalate_nondeterminism {
            if let Some(conflict) = report.conflicts.into_iter().next() {
                return Err(ReuseError::Nondeterminism(conflict));
            }
        }
        Ok(outputs)
    }

    fn hit(&self, outputs: Vec<S::Output>) -> Vec<S::Output> {
        Counters::bump(&self.counters.cache_hits, 1);
        Counters::bump(&self.counters.symbols_saved, outputs.len());
        outputs
    }

    fn pass_through(&self, word: &[S::Input]) -> Answer<S> {
        Counters::bump(&self.counters.full_runs, 1);
        let result = self.sut.run_from_scratch(word).map_err(ReuseError::Sut)?;
        if let Some(state) = result.state {
            state.release();
        }
        check_output_length(word.len(), result.output.len(), None::<S::Handle>)?;
        Ok(result.output)
    }

    /// Answers a batch of queries, the `i`-th result belongs to the `i`-th word. Depending on the
    /// configuration the words are distributed over the rayon thread pool. The first failure is
    /// returned.
    pub fn answer_batch(&self, words: &[Vec<S::Input>]) -> Result<Vec<Vec<S::Output>>, Error<S>>
    where
        S: Sync,
    {
        trace!("answering batch of {} queries", words.len());
        if self.config.parallel_batches {
            words.par_iter().map(|word| self.answer(word)).collect()
        } else {
            words.iter().map(|word| self.answer(word)).collect()
        }
    }

    pub fn stats(&self) -> ReuseStats {
        let tree = self.read_tree();
        ReuseStats {
            queries: self.counters.queries.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            continued: self.counters.continued.load(Ordering::Relaxed),
            full_runs: self.counters.full_runs.load(Ordering::Relaxed),
            symbols_saved: self.counters.symbols_saved.load(Ordering::Relaxed),
            nondeterminism: tree.conflicts(),
            evictions: tree.evictions(),
            released: tree.released(),
            cached_states: tree.cached_states(),
            nodes: tree.size(),
        }
    }

    /// Releases all saved states. Recorded outputs are kept, so known words are still answered
    /// without the system. Returns the number of released states.
    pub fn release_states(&self) -> usize {
        let released = self.write_tree().release_all();
        debug!("released {released} saved states on request");
        released
    }

    /// Tears the oracle down, releasing every state that is still saved, and returns the final
    /// statistics.
    pub fn shutdown(self) -> ReuseStats {
        self.release_states();
        let stats = self.stats();
        info!(
            "reuse oracle answered {} queries with {} resets, {} resumed and {} from the tree",
            stats.queries, stats.full_runs, stats.continued, stats.cache_hits
        );
        stats
    }
}

/// Rejects results whose length does not match the query, releasing the state that came with
/// them. Otherwise the state is handed back.
fn check_output_length<H: StateHandle, E, I: Debug, O: Debug>(
    expected: usize,
    actual: usize,
    state: Option<H>,
) -> Result<Option<H>, ReuseError<E, I, O>> {
    if expected == actual {
        return Ok(state);
    }
    warn!("system under test produced {actual} outputs for {expected} inputs");
    if let Some(state) = state {
        state.release();
    }
    Err(ReuseError::OutputLength { expected, actual })
}

impl<S: ReuseCapable + Sync> MembershipOracle for ReuseOracle<S> {
    type Input = S::Input;
    type Output = Vec<S::Output>;
    type Error = Error<S>;

    fn answer(&self, word: &[S::Input]) -> Answer<S> {
        ReuseOracle::answer(self, word)
    }

    fn answer_batch(&self, words: &[Vec<S::Input>]) -> Result<Vec<Self::Output>, Self::Error> {
        ReuseOracle::answer_batch(self, words)
    }
}

#[cfg(test)]
mod tests {
    use super::ReuseOracle;
    use crate::{
        error::ReuseError,
        mealy::MealyMachine,
        reuse::ReuseConfig,
        sut::{MealySimulator, QueryResult, ReuseCapable, SimulatorError, SimulatorState},
    };

    fn counter() -> MealyMachine<char, u8> {
        counter_with(0)
    }

    /// Counts a's modulo 3, b emits the current count. The very first `a` emits `first`.
    fn counter_with(first: u8) -> MealyMachine<char, u8> {
        MealyMachine::builder()
            .with_transitions([
                (0, 'a', first, 1),
                (1, 'a', 0, 2),
                (2, 'a', 1, 0),
                (0, 'b', 0, 0),
                (1, 'b', 1, 1),
                (2, 'b', 2, 2),
            ])
            .into_mealy(0)
    }

    fn chars(word: &str) -> Vec<char> {
        word.chars().collect()
    }

    /// Drops the last output of every fresh run.
    struct Truncating(MealySimulator<char, u8>);

    impl ReuseCapable for Truncating {
        type Input = char;
        type Output = u8;
        type Handle = SimulatorState;
        type Error = SimulatorError;

        fn run_from_scratch(
            &self,
            word: &[char],
        ) -> Result<QueryResult<u8, SimulatorState>, SimulatorError> {
            let mut result = self.0.run_from_scratch(word)?;
            result.output.pop();
            Ok(result)
        }

        fn continue_from(
            &self,
            state: SimulatorState,
            suffix: &[char],
        ) -> Result<QueryResult<u8, SimulatorState>, SimulatorError> {
            self.0.continue_from(state, suffix)
        }
    }

    #[test_log::test]
    fn known_words_skip_the_system() {
        let oracle = ReuseOracle::new(MealySimulator::new(counter()));
        assert_eq!(oracle.answer(&chars("aab")).unwrap(), vec![0, 0, 2]);
        assert_eq!(oracle.answer(&chars("aa")).unwrap(), vec![0, 0]);
        assert_eq!(oracle.answer(&[]).unwrap(), vec![]);
        assert_eq!(oracle.sut().resets(), 1);

        let stats = oracle.stats();
        assert_eq!(stats.queries, 3);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.full_runs, 1);
        assert_eq!(stats.symbols_saved, 2);
    }

    #[test_log::test]
    fn resumes_deepest_saved_state() {
        let oracle = ReuseOracle::new(MealySimulator::new(counter()));
        oracle.answer(&chars("aa")).unwrap();
        assert_eq!(oracle.answer(&chars("aab")).unwrap(), vec![0, 0, 2]);
        assert_eq!(oracle.sut().resets(), 1);
        assert_eq!(oracle.sut().steps(), 3);
        let stats = oracle.stats();
        assert_eq!(stats.continued, 1);
        assert_eq!(stats.cached_states, 1);
    }

    #[test_log::test]
    fn failure_leaves_tree_untouched() {
        let oracle = ReuseOracle::new(MealySimulator::new(counter()));
        oracle.sut().fail_next();
        let error = oracle.answer(&chars("ab")).unwrap_err();
        assert!(matches!(error, ReuseError::Sut(SimulatorError::ConnectionLost)));
        assert_eq!(oracle.stats().nodes, 1);

        oracle.answer(&chars("a")).unwrap();
        oracle.sut().fail_next();
        assert!(oracle.answer(&chars("ab")).is_err());
        // the spent state is gone, the tree still only knows `a`
        oracle.inspect(|tree| {
            assert_eq!(tree.size(), 2);
            assert_eq!(tree.cached_states(), 0);
        });
        assert_eq!(oracle.sut().live_states(), 0);
        assert_eq!(oracle.answer(&chars("ab")).unwrap(), vec![0, 1]);
    }

    #[test_log::test]
    fn short_output_is_rejected() {
        let oracle = ReuseOracle::new(Truncating(MealySimulator::new(counter())));
        let error = oracle.answer(&chars("ab")).unwrap_err();
        assert!(matches!(
            error,
            ReuseError::OutputLength {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(oracle.sut().0.live_states(), 0);
        assert_eq!(oracle.sut().0.released_states(), 1);
        oracle.inspect(|tree| {
            assert_eq!(tree.size(), 1);
            assert_eq!(tree.cached_states(), 0);
        });

        let config = ReuseConfig::builder().cache_enabled(false).build();
        let oracle = ReuseOracle::with_config(Truncating(MealySimulator::new(counter())), config);
        assert!(matches!(
            oracle.answer(&chars("a")).unwrap_err(),
            ReuseError::OutputLength { .. }
        ));
        assert_eq!(oracle.sut().0.live_states(), 0);
    }

    #[test_log::test]
    fn stateless_system_is_always_reset() {
        let oracle = ReuseOracle::new(MealySimulator::new(counter()).without_states());
        for word in ["a", "b", "ab", "aa", "aab", "a", "ab"] {
            let expected = counter().transform(&chars(word)).unwrap();
            assert_eq!(oracle.answer(&chars(word)).unwrap(), expected);
        }
        let stats = oracle.stats();
        assert_eq!(stats.continued, 0);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.full_runs, 5);
        assert_eq!(oracle.sut().resets(), 5);
        assert_eq!(stats.cached_states, 0);
    }

    #[test_log::test]
    fn node_invalidation_keeps_descendants_resumable() {
        let config = ReuseConfig::builder().propagate_invalidation(false).build();
        let oracle = ReuseOracle::with_config(MealySimulator::new(counter()), config);
        oracle.answer(&chars("aa")).unwrap();
        oracle.sut().replace_machine(counter_with(7));

        // `a` holds no state, so this runs from scratch and contradicts the recorded `a`
        assert_eq!(oracle.answer(&chars("ab")).unwrap(), vec![7, 1]);
        assert_eq!(oracle.stats().nondeterminism, 1);
        oracle.inspect(|tree| {
            let a = tree.node_at(&chars("a")).unwrap();
            let aa = tree.node_at(&chars("aa")).unwrap();
            assert!(tree.is_reuse_disabled(a));
            assert!(!tree.is_reuse_disabled(aa));
            assert!(tree.has_state(aa));
        });

        let resets = oracle.sut().resets();
        assert_eq!(oracle.answer(&chars("aab")).unwrap(), vec![7, 0, 2]);
        assert_eq!(oracle.sut().resets(), resets);
        assert_eq!(oracle.stats().continued, 1);
    }

    #[test_log::test]
    fn overwrite_keeps_reuse_working() {
        let config = ReuseConfig::builder()
            .invalidate_on_nondeterminism(false)
            .build();
        let oracle = ReuseOracle::with_config(MealySimulator::new(counter()), config);
        oracle.answer(&chars("a")).unwrap();
        oracle.answer(&chars("aa")).unwrap();
        oracle.sut().replace_machine(counter_with(7));

        assert_eq!(oracle.answer(&chars("ab")).unwrap(), vec![7, 1]);
        assert_eq!(oracle.answer(&chars("a")).unwrap(), vec![7]);
        oracle.inspect(|tree| {
            let a = tree.node_at(&chars("a")).unwrap();
            assert!(!tree.is_reuse_disabled(a));
        });

        let resets = oracle.sut().resets();
        let continued = oracle.stats().continued;
        assert_eq!(oracle.answer(&chars("abb")).unwrap(), vec![7, 1, 1]);
        assert_eq!(oracle.sut().resets(), resets);
        assert_eq!(oracle.stats().continued, continued + 1);
    }

    #[test_log::test]
    fn disabled_cache_passes_through() {
        let config = ReuseConfig::builder().cache_enabled(false).build();
        let oracle = ReuseOracle::with_config(MealySimulator::new(counter()), config);
        oracle.answer(&chars("ab")).unwrap();
        oracle.answer(&chars("ab")).unwrap();
        assert_eq!(oracle.sut().resets(), 2);
        assert_eq!(oracle.sut().live_states(), 0);
        assert_eq!(oracle.stats().nodes, 1);
    }

    #[test_log::test]
    fn escalated_nondeterminism() {
        let config = ReuseConfig::builder().escalate_nondeterminism(true).build();
        let oracle = ReuseOracle::with_config(MealySimulator::new(counter()), config);
        oracle.answer(&chars("b")).unwrap();
        oracle.sut().replace_machine(
            MealyMachine::builder()
                .with_transitions([(0, 'b', 5, 0)])
                .into_mealy(0),
        );
        // force a run from scratch so the recorded prefix is observed again
        oracle.release_states();
        let error = oracle.answer(&chars("bb")).unwrap_err();
        let ReuseError::Nondeterminism(conflict) = error else {
            panic!("expected a conflict");
        };
        assert_eq!(conflict.prefix, chars("b"));
        assert_eq!((conflict.recorded, conflict.observed), (0, 5));
    }

    #[test_log::test]
    fn shutdown_releases_everything() {
        let oracle = ReuseOracle::new(MealySimulator::new(counter()));
        for word in ["a", "b", "ab", "ba", "aab"] {
            oracle.answer(&chars(word)).unwrap();
        }
        assert!(oracle.sut().live_states() > 0);
        assert_eq!(oracle.release_states(), oracle.sut().released_states());
        assert_eq!(oracle.sut().live_states(), 0);
        assert_eq!(oracle.answer(&chars("aab")).unwrap(), vec![0, 0, 2]);
        let stats = oracle.shutdown();
        assert_eq!(stats.cached_states, 0);
    }
}
