//! Reuse of system states for answering membership queries.
//!
//! Resetting a system under test and replaying a whole query is often the dominating cost of
//! learning. The [`ReuseOracle`] keeps a [`ReuseTree`] of all executed queries. Every edge of the
//! tree remembers the output that was observed for its input symbol, and nodes may hold a saved
//! system state. A query whose prefix is known is then either answered directly from the tree, or
//! resumed from the deepest saved state along its path, so that only the remaining suffix has to
//! be executed.

mod config;
pub use config::{ReuseConfig, ReuseConfigBuilder};

mod policy;
pub use policy::Invalidation;

mod tree;
pub use tree::{Lookup, NodeId, ReuseLookup, ReuseTree, TraceReport};

mod oracle;
pub use oracle::{ReuseOracle, ReuseStats};
