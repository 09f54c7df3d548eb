//! Cycle-resolving relation loading for entgraph.
//!
//! `entgraph-cycle` is the **graph resolution layer**. It loads relations that
//! lead back to an entity type already being loaded (an employee's manager,
//! a country's neighbour) without unbounded recursion and without loading any
//! entity twice.
//!
//! # Role In The Architecture
//!
//! - **Persister**: `EntityPersister` selects through a `BatchedKeySelector`
//!   and notifies post-load listeners and row readers.
//! - **Two-phase loader**: `CycleLoader` records pending targets while rows
//!   are read, then batch-loads the missing ones and applies `RelationFixer`s.
//! - **Configurer**: `CycleConfigurer` registers relations at mapping time and
//!   wires the loader exactly once.
//! - **Session**: `LoadSession` carries all per-load state, so shared loaders
//!   stay free of mutable state and concurrent loads never interact.
//!
//! # Example
//!
//! ```ignore
//! let mut configurer = CycleConfigurer::<Person>::new(CycleLoaderKind::OneToOne);
//! configurer.register_relation::<Person, _>("Person.mentor", set_mentor);
//! let loader = configurer.wire_into(&persons)?;
//! persons.add_row_reader(Arc::new(
//!     loader.self_reference_reader("Person.mentor", |row| row.get_named("mentor_id")),
//! ));
//!
//! let mut session = LoadSession::new(conn);
//! let people = persons.select(&cx, &mut session, &[1, 2, 3]).await;
//! assert!(session.is_idle());
//! ```

pub mod configurer;
pub mod context;
pub mod fixer;
pub mod listener;
pub mod loader;
pub mod persister;
pub mod session;
pub mod storage;

pub use configurer::CycleConfigurer;
pub use context::{CycleSessionContext, PendingSnapshot, RelationStorage};
pub use fixer::RelationFixer;
pub use listener::{RowReader, SelectListener};
pub use loader::{CycleLoader, CycleLoaderKind, LoaderStats, RelationBinding, SelfReferenceReader};
pub use persister::EntityPersister;
pub use session::{ActiveLoader, LoadSession, LoaderId};
pub use storage::EntityRelationStorage;
