//! entgraph - cycle-aware entity graph loading with bounded IN-clause batching.
//!
//! entgraph turns a set of root identifiers into a populated object graph,
//! including graphs whose relations lead back to a type already being loaded,
//! while keeping every statement's parameter count bounded:
//!
//! - Keyed selection split into fixed-size `IN (...)` blocks, one cached
//!   statement per block shape
//! - Simple and composite keys
//! - Two-phase resolution of cyclic relations: no unbounded recursion and no
//!   entity loaded twice in one load
//! - Per-load session state passed explicitly, so loaders can be shared by
//!   any number of concurrent loads
//!
//! # Quick Start
//!
//! ```ignore
//! use entgraph::prelude::*;
//!
//! let selector = BatchedKeySelector::new("person", KeyCodec::single("id"), |row: &Row| {
//!     Ok(Person {
//!         id: row.get_named("id")?,
//!         name: row.get_named("name")?,
//!         mentor: None,
//!     })
//! })
//! .config(SelectConfig::for_dialect(Dialect::Postgres));
//! let persons = Arc::new(EntityPersister::new("person", selector));
//!
//! let mut configurer = CycleConfigurer::<Person>::new(CycleLoaderKind::OneToOne);
//! configurer.register_relation::<Person, _>("Person.mentor", |p: &EntityRef<Person>, m: &EntityRef<Person>| {
//!     p.write().mentor = Some(m.clone());
//! });
//! let loader = configurer.wire_into(&persons)?;
//! persons.add_row_reader(Arc::new(
//!     loader.self_reference_reader("Person.mentor", |row: &Row| row.get_named("mentor_id")),
//! ));
//!
//! let people = entgraph::load(&cx, conn, &persons, &[1, 2, 3]).await;
//! ```

pub mod load;

pub use entgraph_core::{
    AnyEntityRef, BoxFuture, ConfigError, Connection, ConnectionError, Cx, Dialect, Entity,
    EntityHandle, EntityRef, Error, FromValue, Identity, Key, Outcome, QueryError, QueryErrorKind,
    Result, Row, SelectConfig, TypeError, TypeTag, Value,
};
pub use entgraph_cycle::{
    ActiveLoader, CycleConfigurer, CycleLoader, CycleLoaderKind, CycleSessionContext,
    EntityPersister, EntityRelationStorage, LoadSession, LoaderId, LoaderStats, PendingSnapshot,
    RelationBinding, RelationFixer, RowReader, SelectListener, SelfReferenceReader,
};
pub use entgraph_select::{
    BatchedKeySelector, BoundParameter, CacheStats, KeyCodec, LoadedSet, RecordedStatement,
    RecordingSqlListener, RowTransformer, SqlListener, StatementCache, TracingSqlListener,
    block_sizes,
};
pub use load::load;

/// Everything needed to map and load an entity graph.
pub mod prelude {
    pub use crate::{
        BatchedKeySelector, Connection, CycleConfigurer, CycleLoaderKind, Cx, Dialect, Entity,
        EntityPersister, EntityRef, Error, KeyCodec, LoadSession, LoadedSet, Outcome, Result, Row,
        SelectConfig, Value, load,
    };
    pub use std::sync::Arc;
}
