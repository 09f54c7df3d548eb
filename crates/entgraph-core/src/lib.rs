//! Core types and traits for entgraph.
//!
//! This crate provides the foundational abstractions shared by the selector
//! and the cycle loader:
//!
//! - `Entity`, `EntityRef` and `EntityHandle` for identity-carrying instances
//! - `Key` for simple and composite identifiers
//! - `Connection` for read-only query execution
//! - `Value` / `Row` for parameters and results
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod config;
pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod key;
pub mod row;
pub mod value;

pub use config::SelectConfig;
pub use connection::{BoxFuture, Connection};
pub use dialect::Dialect;
pub use entity::{AnyEntityRef, Entity, EntityHandle, EntityRef, Identity, TypeTag};
pub use error::{
    ConfigError, ConnectionError, Error, QueryError, QueryErrorKind, Result,
    TypeError,
};
pub use key::Key;
pub use row::{FromValue, Row};
pub use value::Value;
