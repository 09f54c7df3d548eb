//! Database connection abstraction.
//!
//! The loader only ever reads rows, so the connection surface is the
//! object-safe query subset: one boxed-future `query` and the dialect used to
//! render placeholders. Drivers implement [`Connection`] and the loading
//! pipeline holds it as `Arc<dyn Connection>`.
//!
//! All operations take an asupersync `Cx` for cancellation and timeouts.

use crate::dialect::Dialect;
use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A database connection capable of executing read queries.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn
///     .query(&cx, "SELECT * FROM country WHERE id IN ($1, $2)", &[Value::BigInt(1), Value::BigInt(2)])
///     .await;
/// ```
pub trait Connection: Send + Sync {
    /// The SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return all rows.
    fn query<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>>;
}

impl<C: Connection + ?Sized> Connection for std::sync::Arc<C> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
        (**self).query(cx, sql, params)
    }
}
