//! Shared fixtures for the integration tests: an in-memory keyed table
//! store speaking `SELECT ... FROM t WHERE key IN (...)`, and the `Person`
//! self-referencing mapping.
#![allow(dead_code)]

use asupersync::runtime::RuntimeBuilder;
use entgraph::prelude::*;
use entgraph::{
    BoxFuture, CycleLoader, QueryError, QueryErrorKind, RecordingSqlListener,
};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

/// Rows of one table; the first `key_arity` columns form the key.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    key_arity: usize,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str], key_arity: usize) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            key_arity,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        assert_eq!(values.len(), self.columns.len(), "row width");
        self.rows.push(values);
        self
    }

    fn lookup(&self, params: &[Value]) -> Vec<Row> {
        let mut out = Vec::new();
        for key in params.chunks(self.key_arity) {
            for row in &self.rows {
                if &row[..self.key_arity] == key {
                    out.push(Row::new(self.columns.clone(), row.clone()));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Executed {
    pub fn ids(&self) -> Vec<i64> {
        self.params.iter().filter_map(Value::as_i64).collect()
    }
}

/// In-memory database answering keyed `IN` selects.
pub struct MockDatabase {
    dialect: Dialect,
    tables: HashMap<String, Table>,
    executed: Mutex<Vec<Executed>>,
    fail_at: Option<usize>,
}

impl MockDatabase {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: HashMap::new(),
            executed: Mutex::new(Vec::new()),
            fail_at: None,
        }
    }

    pub fn with_table(mut self, name: &str, table: Table) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    /// Fail the `n`-th query (1-based) with a database error.
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().expect("lock poisoned").clone()
    }

    pub fn bound_ids(&self) -> Vec<Vec<i64>> {
        self.executed().iter().map(Executed::ids).collect()
    }

    pub fn query_count(&self) -> usize {
        self.executed.lock().expect("lock poisoned").len()
    }
}

impl Connection for MockDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query<'a>(
        &'a self,
        _cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
        Box::pin(async move {
            let call = {
                let mut executed = self.executed.lock().expect("lock poisoned");
                executed.push(Executed {
                    sql: sql.to_string(),
                    params: params.to_vec(),
                });
                executed.len()
            };
            // Give concurrent loads on other threads a chance to interleave.
            std::thread::yield_now();

            if self.fail_at == Some(call) {
                return Outcome::Err(Error::Query(
                    QueryError::new(QueryErrorKind::Database, "server closed the connection unexpectedly")
                        .with_sql(sql),
                ));
            }

            let table = sql
                .split(" FROM ")
                .nth(1)
                .and_then(|rest| rest.split(" WHERE ").next())
                .unwrap_or_default();
            match self.tables.get(table) {
                Some(table) => Outcome::Ok(table.lookup(params)),
                None => Outcome::Err(Error::Query(
                    QueryError::new(QueryErrorKind::NotFound, format!("no such table: {table}"))
                        .with_sql(sql),
                )),
            }
        })
    }
}

#[derive(Debug)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub mentor: Option<EntityRef<Person>>,
}

impl Entity for Person {
    type Id = i64;
    const ENTITY_NAME: &'static str = "Person";

    fn id(&self) -> i64 {
        self.id
    }
}

pub fn person_table(rows: &[(i64, &str, Option<i64>)]) -> Table {
    rows.iter().fold(
        Table::new(&["id", "name", "mentor_id"], 1),
        |table, &(id, name, mentor)| table.row(vec![Value::BigInt(id), Value::from(name), Value::from(mentor)]),
    )
}

pub struct PersonGraph {
    pub persister: Arc<EntityPersister<Person>>,
    pub loader: Arc<CycleLoader<Person>>,
    pub statements: RecordingSqlListener,
}

/// `Person.mentor` wired as a one-to-one self reference.
pub fn person_graph(config: SelectConfig) -> PersonGraph {
    let statements = RecordingSqlListener::new();
    let selector = BatchedKeySelector::new("person", KeyCodec::single("id"), |row: &Row| {
        Ok(Person {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            mentor: None,
        })
    })
    .config(config)
    .listener(Arc::new(statements.clone()));
    let persister = Arc::new(EntityPersister::new("person", selector));

    let mut configurer = CycleConfigurer::<Person>::new(CycleLoaderKind::OneToOne);
    configurer.register_relation::<Person, _>(
        "Person.mentor",
        |person: &EntityRef<Person>, mentor: &EntityRef<Person>| {
            person.write().mentor = Some(mentor.clone());
        },
    );
    let loader = configurer.wire_into(&persister).expect("wire Person loader");
    persister.add_row_reader(Arc::new(
        loader.self_reference_reader("Person.mentor", |row: &Row| row.get_named("mentor_id")),
    ));

    PersonGraph {
        persister,
        loader,
        statements,
    }
}

pub fn mentor_of(person: &EntityRef<Person>) -> Option<EntityRef<Person>> {
    person.read().mentor.clone()
}

pub fn name_of(person: &EntityRef<Person>) -> String {
    person.read().name.clone()
}
