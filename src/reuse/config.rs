use crate::{math, word::Symbol};

use super::Invalidation;

/// Configuration of a [`super::ReuseOracle`]. Use [`ReuseConfig::builder`] to deviate from the
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseConfig<O: Symbol> {
    /// Whether anything is cached at all. Without caching every query is run from scratch.
    pub cache_enabled: bool,
    /// Outputs after which a system state must never be saved, e.g. error outputs.
    pub non_reusable_outputs: math::Set<O>,
    /// Upper bound on the number of saved states, `None` means unbounded.
    pub max_cached_states: Option<usize>,
    /// Whether conflicting outputs disable reuse below the conflicting edge.
    pub invalidate_on_nondeterminism: bool,
    /// Whether invalidation covers the whole subtree or only the target node of the edge.
    pub propagate_invalidation: bool,
    /// Whether a conflict is reported to the caller as an error.
    pub escalate_nondeterminism: bool,
    /// Whether batches are answered on the rayon thread pool.
    pub parallel_batches: bool,
}

impl<O: Symbol> Default for ReuseConfig<O> {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            non_reusable_outputs: math::Set::default(),
            max_cached_states: None,
            invalidate_on_nondeterminism: true,
            propagate_invalidation: true,
            escalate_nondeterminism: false,
            parallel_batches: true,
        }
    }
}

impl<O: Symbol> ReuseConfig<O> {
    pub fn builder() -> ReuseConfigBuilder<O> {
        ReuseConfigBuilder {
            config: Self::default(),
        }
    }

    /// The invalidation policy that results from the two nondeterminism related flags.
    pub fn invalidation(&self) -> Invalidation {
        match (
            self.invalidate_on_nondeterminism,
            self.propagate_invalidation,
        ) {
            (false, _) => Invalidation::Overwrite,
            (true, false) => Invalidation::Node,
            (true, true) => Invalidation::Subtree,
        }
    }

    /// Decides whether a state reached by emitting `last_output` may be saved.
    pub fn is_reusable(&self, last_output: &O) -> bool {
        !self.non_reusable_outputs.contains(last_output)
    }
}

/// Builder for [`ReuseConfig`].
#[derive(Debug, Clone)]
pub struct ReuseConfigBuilder<O: Symbol> {
    config: ReuseConfig<O>,
}

impl<O: Symbol> ReuseConfigBuilder<O> {
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    pub fn non_reusable_output(mut self, output: O) -> Self {
        self.config.non_reusable_outputs.insert(output);
        self
    }

    pub fn non_reusable_outputs<I: IntoIterator<Item = O>>(mut self, outputs: I) -> Self {
        self.config.non_reusable_outputs.extend(outputs);
        self
    }

    pub fn max_cached_states(mut self, bound: usize) -> Self {
        self.config.max_cached_states = Some(bound);
        self
    }

    pub fn invalidate_on_nondeterminism(mut self, invalidate: bool) -> Self {
        self.config.invalidate_on_nondeterminism = invalidate;
        self
    }

    pub fn propagate_invalidation(mut self, propagate: bool) -> Self {
        self.config.propagate_invalidation = propagate;
        self
    }

    pub fn escalate_nondeterminism(mut self, escalate: bool) -> Self {
        self.config.escalate_nondeterminism = escalate;
        self
    }

    pub fn parallel_batches(mut self, parallel: bool) -> Self {
        self.config.parallel_batches = parallel;
        self
    }

    pub fn build(self) -> ReuseConfig<O> {
        self.config
    }
}
