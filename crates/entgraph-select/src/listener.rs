//! Statement execution listeners.
//!
//! Listeners observe what the selector sends to the database. They are
//! notified synchronously and cannot influence control flow.

use crate::codec::BoundParameter;
use std::sync::{Arc, Mutex, PoisonError};

/// Observer of executed selector statements.
pub trait SqlListener: Send + Sync {
    /// Called before a statement runs, with its parameter-to-column map.
    fn before_execute(&self, _params: &[BoundParameter]) {}

    /// Called after a statement ran, with the finalized SQL text.
    fn after_execute(&self, _sql: &str) {}
}

/// Listener that emits a `tracing` event per statement.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSqlListener;

impl SqlListener for TracingSqlListener {
    fn before_execute(&self, params: &[BoundParameter]) {
        tracing::trace!(param_count = params.len(), params = ?params, "Binding selector parameters");
    }

    fn after_execute(&self, sql: &str) {
        tracing::debug!(sql = %sql, "Executed selector statement");
    }
}

/// One recorded statement execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    /// Finalized SQL text.
    pub sql: String,
    /// Parameters as bound, in placeholder order.
    pub params: Vec<BoundParameter>,
}

/// Listener that keeps every statement it sees, for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingSqlListener {
    pending: Arc<Mutex<Vec<BoundParameter>>>,
    statements: Arc<Mutex<Vec<RecordedStatement>>>,
}

impl RecordingSqlListener {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements recorded so far.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SqlListener for RecordingSqlListener {
    fn before_execute(&self, params: &[BoundParameter]) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = params.to_vec();
    }

    fn after_execute(&self, sql: &str) {
        let params = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedStatement {
                sql: sql.to_string(),
                params,
            });
    }
}
