//! Identifier encoding for `IN (...)` predicates.
//!
//! A [`KeyCodec`] knows the key columns of one table and turns a block of
//! identifiers into the predicate text and the flat parameter list:
//!
//! - single column: `id IN (?, ?, ?)`
//! - composite: `(a, b) IN ((?, ?), (?, ?))`, parameters bound row-major

use entgraph_core::{Dialect, Error, Key, Result, Value};

/// One bound parameter, as reported to [`SqlListener`](crate::SqlListener)s.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// 1-based placeholder index in the statement.
    pub index: usize,
    /// Key column the parameter is compared against.
    pub column: String,
    /// The bound value.
    pub value: Value,
}

/// Encodes identifiers of a fixed key shape into `IN` predicate blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    columns: Vec<String>,
}

impl KeyCodec {
    /// Codec for a single key column.
    pub fn single(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
        }
    }

    /// Codec for a composite key, columns in key order.
    pub fn composite<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of key columns.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Key column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Check that `K` spans exactly this codec's columns.
    #[allow(clippy::result_large_err)]
    pub fn check_key<K: Key>(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::config("key codec has no columns"));
        }
        if K::ARITY != self.arity() {
            return Err(Error::config(format!(
                "key type {} spans {} column(s) but codec {:?} has {}",
                std::any::type_name::<K>(),
                K::ARITY,
                self.columns,
                self.arity()
            )));
        }
        Ok(())
    }

    /// Render the predicate for a block of `block_size` identifiers.
    ///
    /// Placeholders are numbered from `first_index` (1-based) so the
    /// predicate can follow other bound parameters.
    pub fn in_predicate(&self, dialect: Dialect, block_size: usize, first_index: usize) -> String {
        let arity = self.arity();
        let mut index = first_index;
        let mut tuples = Vec::with_capacity(block_size);
        for _ in 0..block_size {
            let mut slots = Vec::with_capacity(arity);
            for _ in 0..arity {
                slots.push(dialect.placeholder(index));
                index += 1;
            }
            if arity == 1 {
                tuples.extend(slots);
            } else {
                tuples.push(format!("({})", slots.join(", ")));
            }
        }

        if arity == 1 {
            format!("{} IN ({})", self.columns[0], tuples.join(", "))
        } else {
            format!("({}) IN ({})", self.columns.join(", "), tuples.join(", "))
        }
    }

    /// Flatten a block of identifiers into parameters, row-major.
    #[allow(clippy::result_large_err)]
    pub fn bind<K: Key>(&self, ids: &[K]) -> Result<Vec<Value>> {
        let mut params = Vec::with_capacity(ids.len() * self.arity());
        for id in ids {
            let before = params.len();
            id.push_values(&mut params);
            let pushed = params.len() - before;
            if pushed != self.arity() {
                return Err(Error::config(format!(
                    "identifier {:?} produced {} value(s), expected {}",
                    id,
                    pushed,
                    self.arity()
                )));
            }
        }
        Ok(params)
    }

    /// Pair bound parameters with their placeholder index and key column.
    pub fn describe(&self, params: &[Value], first_index: usize) -> Vec<BoundParameter> {
        params
            .iter()
            .enumerate()
            .map(|(offset, value)| BoundParameter {
                index: first_index + offset,
                column: self.columns[offset % self.arity()].clone(),
                value: value.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column_predicate() {
        let codec = KeyCodec::single("id");
        assert_eq!(
            codec.in_predicate(Dialect::Mysql, 3, 1),
            "id IN (?, ?, ?)"
        );
        assert_eq!(codec.in_predicate(Dialect::Mysql, 1, 1), "id IN (?)");
        assert_eq!(
            codec.in_predicate(Dialect::Postgres, 2, 4),
            "id IN ($4, $5)"
        );
    }

    #[test]
    fn test_composite_predicate_and_row_major_binding() {
        let codec = KeyCodec::composite(["a", "b"]);
        assert_eq!(
            codec.in_predicate(Dialect::Mysql, 3, 1),
            "(a, b) IN ((?, ?), (?, ?), (?, ?))"
        );
        assert_eq!(
            codec.in_predicate(Dialect::Sqlite, 2, 1),
            "(a, b) IN ((?1, ?2), (?3, ?4))"
        );

        let params = codec
            .bind(&[(1_i64, 10_i64), (2, 20), (3, 30)])
            .expect("arity matches");
        let raw: Vec<i64> = params.iter().filter_map(Value::as_i64).collect();
        assert_eq!(raw, vec![1, 10, 2, 20, 3, 30]);
    }

    #[test]
    fn test_describe_maps_index_to_column() {
        let codec = KeyCodec::composite(["a", "b"]);
        let params = codec.bind(&[(7_i64, 70_i64)]).expect("arity matches");
        let described = codec.describe(&params, 1);
        assert_eq!(described.len(), 2);
        assert_eq!(described[0].index, 1);
        assert_eq!(described[0].column, "a");
        assert_eq!(described[1].column, "b");
        assert_eq!(described[1].value, Value::BigInt(70));
    }

    #[test]
    fn test_arity_mismatch_is_config_error() {
        let codec = KeyCodec::composite(["a", "b"]);
        assert!(matches!(codec.check_key::<i64>(), Err(Error::Config(_))));
        assert!(matches!(codec.bind(&[5_i64]), Err(Error::Config(_))));
        assert!(codec.check_key::<(i64, String)>().is_ok());
        assert!(KeyCodec::composite(Vec::<String>::new()).check_key::<i64>().is_err());
    }
}
