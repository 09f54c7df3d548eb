//! Explicit per-load session state.
//!
//! A [`LoadSession`] is created by the caller of a top-level select and passed
//! by `&mut` through every nested select. It owns one [`CycleSessionContext`]
//! per active loader, keyed by [`LoaderId`], together with a nesting depth.
//! A context is created when its loader's depth goes from 0 to 1 and dropped
//! when it returns to 0, so a finished load always leaves the session idle.
//!
//! Sessions are never shared: each concurrent load owns its own.

use crate::context::CycleSessionContext;
use entgraph_core::{Connection, Entity};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one loader instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(u64);

impl LoaderId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

struct ContextSlot {
    entity: &'static str,
    depth: usize,
    context: Box<dyn Any + Send>,
}

/// One active loader as reported by [`LoadSession::debug_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLoader {
    /// Loader identity.
    pub loader: LoaderId,
    /// Entity type the loader resolves.
    pub entity: &'static str,
    /// Current nesting depth.
    pub depth: usize,
}

/// Per-load state threaded through every select of one load.
pub struct LoadSession {
    connection: Arc<dyn Connection>,
    contexts: HashMap<LoaderId, ContextSlot>,
}

impl LoadSession {
    /// Start a session reading through `connection`.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            contexts: HashMap::new(),
        }
    }

    /// The connection every select of this load goes through.
    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.connection)
    }

    /// Enter one level of `loader`, creating its context at depth 0.
    ///
    /// Returns the new depth.
    pub(crate) fn enter<T: Entity>(&mut self, loader: LoaderId) -> usize {
        let slot = self.contexts.entry(loader).or_insert_with(|| {
            tracing::trace!(%loader, entity = T::ENTITY_NAME, "Creating cycle context");
            ContextSlot {
                entity: T::ENTITY_NAME,
                depth: 0,
                context: Box::new(CycleSessionContext::<T>::new()),
            }
        });
        slot.depth += 1;
        slot.depth
    }

    /// Leave one level of `loader`; the context is dropped at depth 0.
    ///
    /// Returns the remaining depth. Leaving an inactive loader is a no-op.
    pub(crate) fn leave(&mut self, loader: LoaderId) -> usize {
        let Some(slot) = self.contexts.get_mut(&loader) else {
            return 0;
        };
        slot.depth = slot.depth.saturating_sub(1);
        let depth = slot.depth;
        if depth == 0 {
            tracing::trace!(%loader, entity = slot.entity, "Dropping cycle context");
            self.contexts.remove(&loader);
        }
        depth
    }

    /// The active context of `loader`.
    pub fn context<T: Entity>(&self, loader: LoaderId) -> Option<&CycleSessionContext<T>> {
        self.contexts
            .get(&loader)
            .and_then(|slot| slot.context.downcast_ref())
    }

    /// The active context of `loader`, mutably.
    pub fn context_mut<T: Entity>(&mut self, loader: LoaderId) -> Option<&mut CycleSessionContext<T>> {
        self.contexts
            .get_mut(&loader)
            .and_then(|slot| slot.context.downcast_mut())
    }

    /// Whether no loader holds state in this session.
    pub fn is_idle(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Number of loaders with an active context.
    pub fn active_loaders(&self) -> usize {
        self.contexts.len()
    }

    /// Current nesting depth of `loader` (0 when inactive).
    pub fn depth_of(&self, loader: LoaderId) -> usize {
        self.contexts.get(&loader).map_or(0, |slot| slot.depth)
    }

    /// Active loaders sorted by id.
    pub fn debug_state(&self) -> Vec<ActiveLoader> {
        let mut active: Vec<ActiveLoader> = self
            .contexts
            .iter()
            .map(|(&loader, slot)| ActiveLoader {
                loader,
                entity: slot.entity,
                depth: slot.depth,
            })
            .collect();
        active.sort_by_key(|a| a.loader);
        active
    }
}

impl fmt::Debug for LoadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSession")
            .field("dialect", &self.connection.dialect())
            .field("active", &self.debug_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entgraph_core::{BoxFuture, Cx, Dialect, Error, EntityRef, Outcome, Row, Value};

    struct NoRows;

    impl Connection for NoRows {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn query<'a>(
            &'a self,
            _cx: &'a Cx,
            _sql: &'a str,
            _params: &'a [Value],
        ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
            Box::pin(async { Outcome::Ok(Vec::new()) })
        }
    }

    #[derive(Debug)]
    struct Region {
        id: i32,
    }

    impl Entity for Region {
        type Id = i32;
        const ENTITY_NAME: &'static str = "Region";

        fn id(&self) -> i32 {
            self.id
        }
    }

    #[test]
    fn test_context_lives_until_depth_returns_to_zero() {
        let mut session = LoadSession::new(Arc::new(NoRows));
        let loader = LoaderId::next();
        assert!(session.is_idle());

        assert_eq!(session.enter::<Region>(loader), 1);
        session
            .context_mut::<Region>(loader)
            .expect("context exists")
            .remember([&EntityRef::new(Region { id: 4 })]);

        assert_eq!(session.enter::<Region>(loader), 2);
        assert_eq!(session.depth_of(loader), 2);
        assert_eq!(session.leave(loader), 1);

        let ctx = session.context::<Region>(loader).expect("still active");
        assert!(ctx.is_resolved(&4));

        assert_eq!(session.leave(loader), 0);
        assert!(session.is_idle());
        assert!(session.context::<Region>(loader).is_none());
        assert_eq!(session.leave(loader), 0);
    }

    #[test]
    fn test_loaders_are_isolated() {
        let mut session = LoadSession::new(Arc::new(NoRows));
        let first = LoaderId::next();
        let second = LoaderId::next();
        session.enter::<Region>(first);
        session.enter::<Region>(second);
        session.enter::<Region>(second);

        assert_eq!(session.active_loaders(), 2);
        assert_eq!(
            session.debug_state(),
            vec![
                ActiveLoader {
                    loader: first,
                    entity: "Region",
                    depth: 1
                },
                ActiveLoader {
                    loader: second,
                    entity: "Region",
                    depth: 2
                },
            ]
        );

        session.leave(first);
        assert_eq!(session.active_loaders(), 1);
        assert_eq!(session.depth_of(first), 0);
    }

    #[test]
    fn test_wrong_entity_type_finds_nothing() {
        #[derive(Debug)]
        struct Other;
        impl Entity for Other {
            type Id = i64;
            const ENTITY_NAME: &'static str = "Other";
            fn id(&self) -> i64 {
                0
            }
        }

        let mut session = LoadSession::new(Arc::new(NoRows));
        let loader = LoaderId::next();
        session.enter::<Region>(loader);
        assert!(session.context::<Other>(loader).is_none());
        assert!(format!("{session:?}").contains("Region"));
    }
}
