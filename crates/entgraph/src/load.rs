//! Top-level loads.

use entgraph_core::{Connection, Cx, Entity, Error, Outcome};
use entgraph_cycle::{EntityPersister, LoadSession};
use entgraph_select::LoadedSet;
use std::sync::Arc;

/// Load `ids` through `persister` in a fresh [`LoadSession`].
///
/// Convenience for the common case where the caller does not need to
/// inspect the session afterwards.
#[tracing::instrument(level = "debug", skip_all, fields(entity = T::ENTITY_NAME, ids = ids.len()))]
pub async fn load<T: Entity>(
    cx: &Cx,
    conn: Arc<dyn Connection>,
    persister: &EntityPersister<T>,
    ids: &[T::Id],
) -> Outcome<LoadedSet<T>, Error> {
    let mut session = LoadSession::new(conn);
    let outcome = persister.select(cx, &mut session, ids).await;
    if !session.is_idle() {
        tracing::warn!(active = ?session.debug_state(), "Load finished with cycle contexts still active");
    }
    outcome
}
