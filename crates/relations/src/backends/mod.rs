//! Database Backends
//!
//! The query-execution contract plus its two implementations: PostgreSQL over
//! sqlx, and an in-memory store.

pub mod core;
pub mod memory;
pub mod postgres;

pub use self::core::*;
pub use memory::{LoggedStatement, MemoryExecutor, StatementKind};
pub use postgres::{PoolConfig, PostgresExecutor, PostgresTransactionExecutor};

use serde_json::Value as JsonValue;

/// Build a [`Row`] from a JSON object; anything else yields an empty row
pub fn row_from_json(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map
            .into_iter()
            .map(|(column, value)| (column, DatabaseValue::from_json(value)))
            .collect(),
        _ => Row::new(),
    }
}
