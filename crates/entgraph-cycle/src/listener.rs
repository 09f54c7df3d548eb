//! Persister hooks: post-load listeners and row readers.

use crate::session::{LoadSession, LoaderId};
use entgraph_core::{BoxFuture, Cx, Entity, EntityRef, Error, Outcome, Result, Row};
use entgraph_select::LoadedSet;

/// Hook notified around every select of one persister.
///
/// `before_select` runs before the first statement. Once the batch is fully
/// read, every listener gets `on_batch_read` before any listener's
/// `after_select` runs, so no listener can start nested selects while another
/// still holds undrained state for the outer batch. If the select fails,
/// `on_select_error` runs instead; it is cleanup only and must not swallow
/// the error.
pub trait SelectListener<T: Entity>: Send + Sync {
    /// Identity used to keep registration idempotent.
    fn listener_id(&self) -> LoaderId;

    /// A select for `ids` is about to run.
    fn before_select(&self, session: &mut LoadSession, ids: &[T::Id]);

    /// The batch `roots` was read. Must not issue selects.
    fn on_batch_read(&self, _session: &mut LoadSession, _roots: &LoadedSet<T>) {}

    /// The select finished reading `roots`.
    ///
    /// May issue further selects through `session`, including on the
    /// persister that is notifying it.
    fn after_select<'a>(
        &'a self,
        cx: &'a Cx,
        session: &'a mut LoadSession,
        roots: &'a LoadedSet<T>,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// The select for `ids` failed with `error`.
    fn on_select_error(&self, session: &mut LoadSession, ids: &[T::Id], error: &Error);
}

/// Reads relation-specific columns from each first-phase row.
///
/// Called for every row of the select, including repeated rows of a joined
/// result. Closures of the matching shape are readers.
pub trait RowReader<T: Entity>: Send + Sync {
    /// Inspect `row`, materialized as `entity`.
    #[allow(clippy::result_large_err)]
    fn read_row(&self, session: &mut LoadSession, entity: &EntityRef<T>, row: &Row) -> Result<()>;
}

impl<T, F> RowReader<T> for F
where
    T: Entity,
    F: Fn(&mut LoadSession, &EntityRef<T>, &Row) -> Result<()> + Send + Sync,
{
    fn read_row(&self, session: &mut LoadSession, entity: &EntityRef<T>, row: &Row) -> Result<()> {
        self(session, entity, row)
    }
}
