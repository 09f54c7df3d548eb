//! Entity persister: keyed selection plus post-load hooks.

use crate::listener::{RowReader, SelectListener};
use crate::session::LoadSession;
use entgraph_core::{BoxFuture, Cx, Entity, EntityRef, Error, Outcome};
use entgraph_select::{BatchedKeySelector, LoadedSet};
use std::sync::{Arc, PoisonError, RwLock};

/// Loads entities of one type by identifier and notifies its hooks.
///
/// Persisters are built once per entity type and shared (`Arc`) by every
/// load. Hooks are registered at mapping-build time; each select works on a
/// snapshot of them.
pub struct EntityPersister<T: Entity> {
    name: String,
    selector: BatchedKeySelector<T>,
    listeners: RwLock<Vec<Arc<dyn SelectListener<T>>>>,
    readers: RwLock<Vec<Arc<dyn RowReader<T>>>>,
}

impl<T: Entity> EntityPersister<T> {
    /// Create a persister named `name` selecting through `selector`.
    pub fn new(name: impl Into<String>, selector: BatchedKeySelector<T>) -> Self {
        Self {
            name: name.into(),
            selector,
            listeners: RwLock::new(Vec::new()),
            readers: RwLock::new(Vec::new()),
        }
    }

    /// Persister name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying selector.
    pub fn selector(&self) -> &BatchedKeySelector<T> {
        &self.selector
    }

    /// Identifier of a loaded entity.
    pub fn get_id(&self, entity: &EntityRef<T>) -> T::Id {
        entity.id()
    }

    /// Attach a post-load listener.
    ///
    /// Returns `false` without attaching if a listener with the same id is
    /// already registered.
    pub fn add_post_load_listener(&self, listener: Arc<dyn SelectListener<T>>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let id = listener.listener_id();
        if listeners.iter().any(|l| l.listener_id() == id) {
            tracing::debug!(persister = %self.name, listener = %id, "Listener already attached");
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Attach a row reader, called for every first-phase row.
    pub fn add_row_reader(&self, reader: Arc<dyn RowReader<T>>) {
        self.readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reader);
    }

    /// Number of attached post-load listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn listeners(&self) -> Vec<Arc<dyn SelectListener<T>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn readers(&self) -> Vec<Arc<dyn RowReader<T>>> {
        self.readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load the entities identified by `ids`, then run every post-load hook.
    ///
    /// On failure every hook that has not completed gets `on_select_error`,
    /// and the original outcome is returned unchanged.
    pub fn select<'a>(
        &'a self,
        cx: &'a Cx,
        session: &'a mut LoadSession,
        ids: &'a [T::Id],
    ) -> BoxFuture<'a, Outcome<LoadedSet<T>, Error>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Outcome::Ok(LoadedSet::new());
            }

            let listeners = self.listeners();
            let readers = self.readers();
            tracing::debug!(
                persister = %self.name,
                ids = ids.len(),
                listeners = listeners.len(),
                "Persister select"
            );

            for listener in &listeners {
                listener.before_select(session, ids);
            }

            let conn = session.connection();
            let outcome = {
                let session = &mut *session;
                self.selector
                    .select(cx, conn.as_ref(), ids, |entity, row| {
                        for reader in &readers {
                            reader.read_row(session, entity, row)?;
                        }
                        Ok(())
                    })
                    .await
            };

            let roots = match outcome {
                Outcome::Ok(roots) => roots,
                Outcome::Err(e) => {
                    fail_all(&listeners, session, ids, &e);
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => {
                    fail_all(&listeners, session, ids, &Error::Cancelled);
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    fail_all(&listeners, session, ids, &Error::Custom("select panicked".to_string()));
                    return Outcome::Panicked(p);
                }
            };

            for listener in &listeners {
                listener.on_batch_read(session, &roots);
            }
            for (done, listener) in listeners.iter().enumerate() {
                let remaining = &listeners[done + 1..];
                match listener.after_select(cx, session, &roots).await {
                    Outcome::Ok(()) => {}
                    Outcome::Err(e) => {
                        fail_all(remaining, session, ids, &e);
                        return Outcome::Err(e);
                    }
                    Outcome::Cancelled(r) => {
                        fail_all(remaining, session, ids, &Error::Cancelled);
                        return Outcome::Cancelled(r);
                    }
                    Outcome::Panicked(p) => {
                        fail_all(remaining, session, ids, &Error::Custom("post-load hook panicked".to_string()));
                        return Outcome::Panicked(p);
                    }
                }
            }

            Outcome::Ok(roots)
        })
    }
}

fn fail_all<T: Entity>(
    listeners: &[Arc<dyn SelectListener<T>>],
    session: &mut LoadSession,
    ids: &[T::Id],
    error: &Error,
) {
    tracing::debug!(listeners = listeners.len(), error = %error, "Select failed, releasing hooks");
    for listener in listeners {
        listener.on_select_error(session, ids, error);
    }
}

impl<T: Entity> std::fmt::Debug for EntityPersister<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPersister")
            .field("name", &self.name)
            .field("entity", &T::ENTITY_NAME)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LoaderId;
    use asupersync::runtime::RuntimeBuilder;
    use entgraph_core::{Connection, Dialect, QueryError, QueryErrorKind, Row, SelectConfig, Value};
    use entgraph_select::KeyCodec;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Tag {
        id: i64,
    }

    impl Entity for Tag {
        type Id = i64;
        const ENTITY_NAME: &'static str = "Tag";

        fn id(&self) -> i64 {
            self.id
        }
    }

    struct TagTable {
        fail: bool,
        queries: Mutex<usize>,
    }

    impl Connection for TagTable {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn query<'a>(
            &'a self,
            _cx: &'a Cx,
            _sql: &'a str,
            params: &'a [Value],
        ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
            Box::pin(async move {
                *self.queries.lock().expect("lock poisoned") += 1;
                if self.fail {
                    return Outcome::Err(Error::Query(QueryError::new(
                        QueryErrorKind::Database,
                        "relation \"tag\" does not exist",
                    )));
                }
                Outcome::Ok(
                    params
                        .iter()
                        .map(|v| Row::new(vec!["id".to_string()], vec![v.clone()]))
                        .collect(),
                )
            })
        }
    }

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
        fail_after: bool,
    }

    impl Journal {
        fn log(&self, event: String) {
            self.events.lock().expect("lock poisoned").push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("lock poisoned").clone()
        }
    }

    struct JournalListener(Arc<Journal>, LoaderId);

    impl SelectListener<Tag> for JournalListener {
        fn listener_id(&self) -> LoaderId {
            self.1
        }

        fn before_select(&self, _session: &mut LoadSession, ids: &[i64]) {
            self.0.log(format!("before {ids:?}"));
        }

        fn on_batch_read(&self, _session: &mut LoadSession, roots: &LoadedSet<Tag>) {
            self.0.log(format!("read {:?}", roots.ids()));
        }

        fn after_select<'a>(
            &'a self,
            _cx: &'a Cx,
            _session: &'a mut LoadSession,
            roots: &'a LoadedSet<Tag>,
        ) -> BoxFuture<'a, Outcome<(), Error>> {
            Box::pin(async move {
                self.0.log(format!("after {:?}", roots.ids()));
                if self.0.fail_after {
                    return Outcome::Err(Error::Custom("hook failed".to_string()));
                }
                Outcome::Ok(())
            })
        }

        fn on_select_error(&self, _session: &mut LoadSession, ids: &[i64], error: &Error) {
            self.0.log(format!("error {ids:?}: {error}"));
        }
    }

    fn persister() -> EntityPersister<Tag> {
        let selector = BatchedKeySelector::new("tag", KeyCodec::single("id"), |row: &Row| {
            Ok(Tag {
                id: row.get_named("id")?,
            })
        })
        .config(SelectConfig::default().max_in_arity(2));
        EntityPersister::new("tags", selector)
    }

    fn session(fail: bool) -> (LoadSession, Arc<TagTable>) {
        let conn = Arc::new(TagTable {
            fail,
            queries: Mutex::new(0),
        });
        (LoadSession::new(conn.clone()), conn)
    }

    fn run<F: std::future::Future>(future: F) -> F::Output {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(future)
    }

    #[test]
    fn test_hooks_run_in_order_around_select() {
        let persister = persister();
        let journal = Arc::new(Journal::default());
        let listener_id = LoaderId::next();
        assert!(persister.add_post_load_listener(Arc::new(JournalListener(journal.clone(), listener_id))));
        assert!(!persister.add_post_load_listener(Arc::new(JournalListener(journal.clone(), listener_id))));
        assert_eq!(persister.listener_count(), 1);

        let rows_read = Arc::new(Mutex::new(0));
        let counter = rows_read.clone();
        persister.add_row_reader(Arc::new(move |_: &mut LoadSession, _: &EntityRef<Tag>, _: &Row| -> entgraph_core::Result<()> {
            *counter.lock().expect("lock poisoned") += 1;
            Ok(())
        }));

        let (mut session, conn) = session(false);
        let cx = Cx::for_testing();
        let loaded = match run(persister.select(&cx, &mut session, &[1, 2, 3])) {
            Outcome::Ok(loaded) => loaded,
            other => panic!("expected rows, got {other:?}"),
        };

        assert_eq!(loaded.ids(), vec![1, 2, 3]);
        assert_eq!(*conn.queries.lock().expect("lock poisoned"), 2);
        assert_eq!(*rows_read.lock().expect("lock poisoned"), 3);
        assert_eq!(
            journal.events(),
            vec!["before [1, 2, 3]", "read [1, 2, 3]", "after [1, 2, 3]"]
        );
    }

    #[test]
    fn test_empty_ids_skip_hooks() {
        let persister = persister();
        let journal = Arc::new(Journal::default());
        persister.add_post_load_listener(Arc::new(JournalListener(journal.clone(), LoaderId::next())));

        let (mut session, conn) = session(false);
        let cx = Cx::for_testing();
        let outcome = run(persister.select(&cx, &mut session, &[]));
        assert!(matches!(outcome, Outcome::Ok(ref set) if set.is_empty()));
        assert_eq!(*conn.queries.lock().expect("lock poisoned"), 0);
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_storage_failure_notifies_every_listener() {
        let persister = persister();
        let first = Arc::new(Journal::default());
        let second = Arc::new(Journal::default());
        persister.add_post_load_listener(Arc::new(JournalListener(first.clone(), LoaderId::next())));
        persister.add_post_load_listener(Arc::new(JournalListener(second.clone(), LoaderId::next())));

        let (mut session, _conn) = session(true);
        let cx = Cx::for_testing();
        match run(persister.select(&cx, &mut session, &[5])) {
            Outcome::Err(Error::Query(q)) => assert_eq!(q.message, "relation \"tag\" does not exist"),
            other => panic!("expected query error, got {other:?}"),
        }

        let expected = vec![
            "before [5]".to_string(),
            "error [5]: Query error: relation \"tag\" does not exist".to_string(),
        ];
        assert_eq!(first.events(), expected);
        assert_eq!(second.events(), expected);
    }

    #[test]
    fn test_failing_hook_releases_the_rest() {
        let persister = persister();
        let failing = Arc::new(Journal {
            fail_after: true,
            ..Journal::default()
        });
        let later = Arc::new(Journal::default());
        persister.add_post_load_listener(Arc::new(JournalListener(failing.clone(), LoaderId::next())));
        persister.add_post_load_listener(Arc::new(JournalListener(later.clone(), LoaderId::next())));

        let (mut session, _conn) = session(false);
        let cx = Cx::for_testing();
        let outcome = run(persister.select(&cx, &mut session, &[8]));
        assert!(matches!(outcome, Outcome::Err(Error::Custom(ref m)) if m == "hook failed"));

        assert_eq!(failing.events(), vec!["before [8]", "read [8]", "after [8]"]);
        assert_eq!(later.events(), vec!["before [8]", "read [8]", "error [8]: hook failed"]);
    }

    #[test]
    fn test_every_listener_sees_the_batch_before_any_resolves() {
        let persister = persister();
        let journal = Arc::new(Journal::default());
        persister.add_post_load_listener(Arc::new(JournalListener(journal.clone(), LoaderId::next())));
        persister.add_post_load_listener(Arc::new(JournalListener(journal.clone(), LoaderId::next())));

        let (mut session, _conn) = session(false);
        let cx = Cx::for_testing();
        assert!(matches!(run(persister.select(&cx, &mut session, &[4])), Outcome::Ok(_)));

        assert_eq!(
            journal.events(),
            vec!["before [4]", "before [4]", "read [4]", "read [4]", "after [4]", "after [4]"]
        );
    }
}
