//! Selector configuration.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for batched keyed selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectConfig {
    /// Maximum number of identifiers bound into one `IN (...)` predicate.
    pub max_in_arity: usize,
    /// Maximum number of distinct statement templates kept per selector.
    pub statement_cache_size: usize,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self::for_dialect(Dialect::default())
    }
}

impl SelectConfig {
    /// Defaults tuned to a dialect's parameter limits.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            max_in_arity: dialect.default_max_in_arity(),
            statement_cache_size: 64,
        }
    }

    /// Set the maximum IN-operator arity.
    pub fn max_in_arity(mut self, arity: usize) -> Self {
        self.max_in_arity = arity;
        self
    }

    /// Set the statement cache capacity.
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Reject settings that would make the selector loop or never cache.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.max_in_arity == 0 {
            return Err(Error::config("max_in_arity must be at least 1"));
        }
        if self.statement_cache_size == 0 {
            return Err(Error::config("statement_cache_size must be at least 1"));
        }
        Ok(())
    }
}
