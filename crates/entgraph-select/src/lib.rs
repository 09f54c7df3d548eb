//! Bounded IN-clause batching for entgraph.
//!
//! `entgraph-select` is the **keyed selection layer**. Given a list of
//! identifiers it issues the fewest `SELECT ... WHERE key IN (...)` statements
//! the configured `IN` arity allows and materializes the rows into shared
//! [`EntityRef`](entgraph_core::EntityRef)s.
//!
//! # Role In The Architecture
//!
//! - **Key codec**: renders single and composite `IN` predicates and binds
//!   identifiers row-major.
//! - **Template cache**: one rendered statement per block size and dialect,
//!   reused across loads.
//! - **Listeners**: observe parameter binding and executed statements.
//!
//! The cycle loader in `entgraph-cycle` drives this selector for both the
//! first-phase select and every second-phase (fixer) select.

pub mod cache;
pub mod codec;
pub mod listener;
pub mod loaded;
pub mod selector;

pub use cache::{CacheStats, StatementCache, TemplateKey};
pub use codec::{BoundParameter, KeyCodec};
pub use listener::{RecordedStatement, RecordingSqlListener, SqlListener, TracingSqlListener};
pub use loaded::LoadedSet;
pub use selector::{BatchedKeySelector, RowTransformer, block_sizes};
