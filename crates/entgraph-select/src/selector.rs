//! Batched keyed selection.
//!
//! [`BatchedKeySelector`] loads the entities matching a list of identifiers
//! with as few bounded statements as possible. Identifiers are split into
//! consecutive blocks of `max_in_arity` keys, lowered when needed so a block's
//! parameters (keys times key columns) fit the dialect's bind limit. All
//! blocks but the last are full, so at most two statement shapes exist per
//! call and each is rendered once and cached.

use crate::cache::{CacheStats, StatementCache, TemplateKey};
use crate::codec::KeyCodec;
use crate::listener::SqlListener;
use crate::loaded::LoadedSet;
use entgraph_core::{
    Connection, Cx, Dialect, Entity, EntityRef, Error, Outcome, Result, Row, SelectConfig,
};
use std::sync::{Arc, Mutex, PoisonError};

/// Row-to-entity transformation supplied by the field-mapping layer.
pub type RowTransformer<T> = Arc<dyn Fn(&Row) -> Result<T> + Send + Sync>;

/// Sizes of the consecutive blocks `total` identifiers are split into.
///
/// Every block but the last has exactly `max_in_arity` elements.
pub fn block_sizes(total: usize, max_in_arity: usize) -> Vec<usize> {
    let max_in_arity = max_in_arity.max(1);
    let mut sizes = vec![max_in_arity; total / max_in_arity];
    if total % max_in_arity != 0 {
        sizes.push(total % max_in_arity);
    }
    sizes
}

/// Selects entities of type `T` by identifier in bounded `IN` blocks.
pub struct BatchedKeySelector<T: Entity> {
    from: String,
    projection: String,
    codec: KeyCodec,
    config: SelectConfig,
    transformer: RowTransformer<T>,
    templates: Mutex<StatementCache>,
    listeners: Vec<Arc<dyn SqlListener>>,
}

impl<T: Entity> BatchedKeySelector<T> {
    /// Create a selector reading from `from` (a table name or join clause).
    pub fn new<F>(from: impl Into<String>, codec: KeyCodec, transformer: F) -> Self
    where
        F: Fn(&Row) -> Result<T> + Send + Sync + 'static,
    {
        let config = SelectConfig::default();
        Self {
            from: from.into(),
            projection: "*".to_string(),
            codec,
            templates: Mutex::new(StatementCache::new(config.statement_cache_size)),
            config,
            transformer: Arc::new(transformer),
            listeners: Vec::new(),
        }
    }

    /// Set the projected column list (defaults to `*`).
    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = projection.into();
        self
    }

    /// Replace the selector configuration.
    pub fn config(mut self, config: SelectConfig) -> Self {
        self.templates = Mutex::new(StatementCache::new(config.statement_cache_size));
        self.config = config;
        self
    }

    /// Attach a statement listener.
    pub fn listener(mut self, listener: Arc<dyn SqlListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The key codec of this selector.
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// The active configuration.
    pub fn select_config(&self) -> &SelectConfig {
        &self.config
    }

    /// Template cache counters.
    pub fn template_stats(&self) -> CacheStats {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }

    /// The statement used for a block of `block_size` identifiers.
    pub fn statement_for(&self, dialect: Dialect, block_size: usize) -> Arc<str> {
        let key = TemplateKey {
            dialect,
            block_size,
        };
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(key, || {
                format!(
                    "SELECT {} FROM {} WHERE {}",
                    self.projection,
                    self.from,
                    self.codec.in_predicate(dialect, block_size, 1)
                )
            })
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.codec.check_key::<T::Id>()
    }

    /// Keys per block on `dialect`: `max_in_arity`, capped so that one
    /// block never binds more than the dialect's parameter limit.
    pub fn block_size_for(&self, dialect: Dialect) -> usize {
        let by_parameters = (dialect.max_bind_parameters() / self.codec.arity().max(1)).max(1);
        if by_parameters < self.config.max_in_arity {
            tracing::trace!(
                configured = self.config.max_in_arity,
                capped = by_parameters,
                key_columns = self.codec.arity(),
                "Block size capped by bind parameter limit"
            );
            return by_parameters;
        }
        self.config.max_in_arity
    }

    /// Load the entities identified by `ids`.
    ///
    /// `on_row` sees every row with the entity it materialized into, including
    /// rows repeating an identifier already seen (joined result sets). An
    /// error from `on_row` aborts the selection.
    ///
    /// No statement is issued for an empty `ids`.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, conn, ids, on_row),
        fields(entity = T::ENTITY_NAME, id_count = ids.len())
    )]
    pub async fn select<F>(
        &self,
        cx: &Cx,
        conn: &dyn Connection,
        ids: &[T::Id],
        mut on_row: F,
    ) -> Outcome<LoadedSet<T>, Error>
    where
        F: FnMut(&EntityRef<T>, &Row) -> Result<()> + Send,
    {
        let mut loaded = LoadedSet::new();
        if ids.is_empty() {
            return Outcome::Ok(loaded);
        }
        if let Err(e) = self.validate() {
            return Outcome::Err(e);
        }

        let dialect = conn.dialect();
        let block = self.block_size_for(dialect);
        tracing::debug!(
            block_size = block,
            block_count = ids.len().div_ceil(block),
            "Selecting by key"
        );

        for chunk in ids.chunks(block) {
            let sql = self.statement_for(dialect, chunk.len());
            let params = match self.codec.bind(chunk) {
                Ok(params) => params,
                Err(e) => return Outcome::Err(e),
            };

            if !self.listeners.is_empty() {
                let described = self.codec.describe(&params, 1);
                for listener in &self.listeners {
                    listener.before_execute(&described);
                }
            }

            let rows = match conn.query(cx, &sql, &params).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            for listener in &self.listeners {
                listener.after_execute(&sql);
            }
            tracing::trace!(sql = %sql, row_count = rows.len(), "Key block executed");

            for row in &rows {
                let entity = match (self.transformer)(row) {
                    Ok(entity) => entity,
                    Err(e) => return Outcome::Err(e),
                };
                let id = entity.id();
                let entity = match loaded.get(&id) {
                    Some(existing) => existing.clone(),
                    None => loaded.insert(id, EntityRef::new(entity)),
                };
                if let Err(e) = on_row(&entity, row) {
                    return Outcome::Err(e);
                }
            }
        }

        tracing::debug!(loaded = loaded.len(), "Selection complete");
        Outcome::Ok(loaded)
    }
}

impl<T: Entity> std::fmt::Debug for BatchedKeySelector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedKeySelector")
            .field("entity", &T::ENTITY_NAME)
            .field("from", &self.from)
            .field("codec", &self.codec)
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
