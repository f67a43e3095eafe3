//! Global and local query scopes

use std::sync::Arc;

use crate::backends::DatabaseValue;
use crate::error::ModelResult;
use crate::model::ModelDefinition;
use crate::query::{ModelQuery, QueryBuilder};

/// Name the soft-deleting scope is registered under
pub const SOFT_DELETING_SCOPE: &str = "soft_deleting";

/// A constraint applied to every terminal query of a model type
pub trait Scope: Send + Sync {
    fn apply(&self, query: QueryBuilder, model: &ModelDefinition) -> QueryBuilder;
}

/// Closure-backed global scope
pub struct ScopeFn<F>(pub F);

impl<F> Scope for ScopeFn<F>
where
    F: Fn(QueryBuilder, &ModelDefinition) -> QueryBuilder + Send + Sync,
{
    fn apply(&self, query: QueryBuilder, model: &ModelDefinition) -> QueryBuilder {
        (self.0)(query, model)
    }
}

/// Hides rows whose `deleted_at` column is set
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftDeletingScope;

impl Scope for SoftDeletingScope {
    fn apply(&self, query: QueryBuilder, model: &ModelDefinition) -> QueryBuilder {
        match model.deleted_at_column() {
            Some(column) => {
                let column = query.qualify(column);
                query.where_null(&column)
            }
            None => query,
        }
    }
}

/// Named scope invoked explicitly through [`ModelQuery::scope`]
pub type LocalScope = Arc<dyn Fn(ModelQuery, &[DatabaseValue]) -> ModelResult<ModelQuery> + Send + Sync>;
