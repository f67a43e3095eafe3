//! # elif-relations: relation resolution and eager loading for elif.rs
//!
//! Model types are registered once in an immutable [`ModelRegistry`] together
//! with their scopes and relations. Queries go through a [`ModelQuery`], which
//! applies global scopes at execution time and eager loads relation paths in
//! batches: one extra query per path, whatever the number of parents.
//!
//! ```ignore
//! let posts = ctx.query("Post")?.with(["author", "comments.author"]).get().await?;
//! let changes = ctx.belongs_to_many(&user, "roles")?.sync(["2", "3"]).await?;
//! ```

pub mod backends;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod loading;
pub mod model;
pub mod query;
pub mod relationships;
pub mod scope;

#[cfg(test)]
pub(crate) mod testing;

pub use backends::{
    row_from_json, DatabaseValue, KeyType, MemoryExecutor, PoolConfig, PostgresExecutor,
    PostgresTransactionExecutor, QueryExecutor, Row, SqlDialect,
};
pub use collection::Collection;
pub use config::OrmConfig;
pub use context::OrmContext;
pub use error::{ModelError, ModelResult, OrmError, OrmResult};
pub use loading::{AggregateFunction, EagerLoadSpec};
pub use model::{
    Attributable, Model, ModelDefinition, ModelDefinitionBuilder, ModelRegistry, Relatable,
    RelationValue, SoftDeletable, Timestamped,
};
pub use query::{
    ModelQuery, OrderDirection, Paginator, QueryBuilder, QueryOperator, WhereBoolean, WhereCondition, WhereGroup,
};
pub use relationships::{
    BelongsTo, BelongsToMany, HasManyThrough, HasOneOrMany, Pivot, Relation, RelationKind,
    RelationSpec, SyncChanges, SyncIds,
};
pub use scope::{LocalScope, Scope, ScopeFn, SoftDeletingScope, SOFT_DELETING_SCOPE};
