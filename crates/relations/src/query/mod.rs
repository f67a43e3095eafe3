//! Query Builder - engine-level SQL descriptions and the per-model query wrapper

pub mod builder;
pub mod execution;
pub mod existence;
pub mod joins;
pub mod model_query;
pub mod ordering;
pub mod pagination;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

#[cfg(test)]
mod execution_tests;

pub use builder::QueryBuilder;
pub use existence::WhereBoolean;
pub use model_query::ModelQuery;
pub use pagination::Paginator;
pub use sql_generation::insert_sql_with_params;
pub use types::*;
