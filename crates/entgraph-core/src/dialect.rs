//! SQL dialect knobs the loader depends on.

use serde::{Deserialize, Serialize};

/// SQL dialect for generating dialect-specific placeholders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Default number of keys per `IN (...)` list.
    ///
    /// This counts keys, not parameters: a composite key binds one parameter
    /// per column. Selectors additionally cap blocks so that
    /// [`max_bind_parameters`](Self::max_bind_parameters) holds.
    pub const fn default_max_in_arity(self) -> usize {
        match self {
            Dialect::Postgres | Dialect::Mysql => 1000,
            Dialect::Sqlite => 999,
        }
    }

    /// Most parameters one statement may bind.
    ///
    /// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` is 999; the PostgreSQL
    /// and MySQL wire protocols count parameters in 16 bits.
    pub const fn max_bind_parameters(self) -> usize {
        match self {
            Dialect::Postgres | Dialect::Mysql => 65_535,
            Dialect::Sqlite => 999,
        }
    }
}
