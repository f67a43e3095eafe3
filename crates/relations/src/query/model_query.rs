//! Model Query - a QueryBuilder bound to a model type, with scopes and eager loads

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::backends::DatabaseValue;
use crate::context::OrmContext;
use crate::error::ModelResult;
use crate::loading::{AggregateLoad, EagerLoadSpec};
use crate::model::ModelDefinition;
use crate::scope::SOFT_DELETING_SCOPE;

use super::builder::QueryBuilder;
use super::existence::ExistenceFilter;
use super::types::OrderDirection;

/// Per-model query.
///
/// Builder methods consume and return the query. Global scopes are not baked
/// in: they are applied to a copy of the builder by every terminal operation,
/// so `without_global_scope` works at any point in the chain.
#[derive(Clone)]
pub struct ModelQuery {
    pub(crate) ctx: OrmContext,
    pub(crate) model: Arc<ModelDefinition>,
    pub(crate) query: QueryBuilder,
    pub(crate) eager_load: EagerLoadSpec,
    pub(crate) removed_scopes: BTreeSet<String>,
    pub(crate) existence: Vec<ExistenceFilter>,
    pub(crate) aggregates: Vec<AggregateLoad>,
}

impl ModelQuery {
    pub fn new(ctx: OrmContext, model: Arc<ModelDefinition>) -> Self {
        let query = QueryBuilder::table(model.table());
        Self {
            ctx,
            model,
            query,
            eager_load: EagerLoadSpec::default(),
            removed_scopes: BTreeSet::new(),
            existence: Vec::new(),
            aggregates: Vec::new(),
        }
    }

    /// Read the model's table under another name (self-referencing relations)
    pub(crate) fn aliased(mut self, alias: &str) -> Self {
        let table = format!("{} as {}", self.model.table(), alias);
        self.query = self.query.from(&table);
        self
    }

    pub fn model(&self) -> &Arc<ModelDefinition> {
        &self.model
    }

    pub fn context(&self) -> &OrmContext {
        &self.ctx
    }

    /// The builder as composed so far, without global scopes
    pub fn builder(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn eager_load(&self) -> &EagerLoadSpec {
        &self.eager_load
    }

    /// Qualify a bare column with the model table or its alias
    pub fn qualify(&self, column: &str) -> String {
        self.query.qualify(column)
    }

    /// Apply a raw builder transformation
    pub fn map_builder<F: FnOnce(QueryBuilder) -> QueryBuilder>(mut self, f: F) -> Self {
        self.query = f(self.query);
        self
    }

    /// The composed query plus every global scope not removed. Relation
    /// existence filters need a lookup first; see [`ModelQuery::resolve_builder`].
    pub fn to_builder(&self) -> QueryBuilder {
        self.apply_global_scopes(self.query.clone())
    }

    pub(crate) fn apply_global_scopes(&self, mut query: QueryBuilder) -> QueryBuilder {
        for (name, scope) in self.model.global_scopes() {
            if !self.removed_scopes.contains(name) {
                query = scope.apply(query, &self.model);
            }
        }
        query
    }

    // Eager loading

    /// Merge relations to eager load: a name, `"rel:col1,col2"`, a dotted
    /// path, a list of those, or a prepared [`EagerLoadSpec`]
    pub fn with<S: Into<EagerLoadSpec>>(mut self, spec: S) -> Self {
        self.eager_load = self.eager_load.merge(spec.into());
        self
    }

    /// Eager load `path` with a constraint on the relation query
    pub fn with_constraint<F>(mut self, path: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.eager_load = self.eager_load.with_constraint(path, constraint);
        self
    }

    /// Drop a path (and everything nested under it) from the eager loads
    pub fn without(mut self, path: &str) -> Self {
        self.eager_load = self.eager_load.without(path);
        self
    }

    // Scopes

    /// Invoke a local scope registered on the model type
    pub fn scope(self, name: &str, args: &[DatabaseValue]) -> ModelResult<Self> {
        let scope = self.model.local_scope(name)?.clone();
        scope(self, args)
    }

    pub fn without_global_scope(mut self, name: &str) -> Self {
        self.removed_scopes.insert(name.to_string());
        self
    }

    pub fn without_global_scopes(mut self) -> Self {
        let names: Vec<String> = self.model.global_scopes().map(|(name, _)| name.to_string()).collect();
        self.removed_scopes.extend(names);
        self
    }

    /// Include soft-deleted rows
    pub fn with_trashed(self) -> Self {
        self.without_global_scope(SOFT_DELETING_SCOPE)
    }

    /// Only soft-deleted rows
    pub fn only_trashed(self) -> Self {
        match self.model.deleted_at_column().map(str::to_string) {
            Some(column) => {
                let column = self.qualify(&column);
                self.with_trashed().where_not_null(&column)
            }
            None => self,
        }
    }

    /// Exclude soft-deleted rows again after `with_trashed`
    pub fn without_trashed(mut self) -> Self {
        self.removed_scopes.remove(SOFT_DELETING_SCOPE);
        self
    }

    // Builder surface

    pub fn select(self, columns: &[&str]) -> Self {
        self.map_builder(|q| q.select(columns))
    }

    pub fn add_select(self, columns: &[&str]) -> Self {
        self.map_builder(|q| q.add_select(columns))
    }

    /// Select columns, qualifying bare names with the model table
    pub fn select_qualified(self, columns: &[&str]) -> Self {
        let qualified: Vec<String> = columns.iter().map(|c| self.qualify(c.trim())).collect();
        let qualified: Vec<&str> = qualified.iter().map(String::as_str).collect();
        self.map_builder(|q| q.select(&qualified))
    }

    pub fn distinct(self) -> Self {
        self.map_builder(QueryBuilder::distinct)
    }

    pub fn where_eq<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.map_builder(|q| q.where_eq(column, value))
    }

    pub fn where_ne<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.map_builder(|q| q.where_ne(column, value))
    }

    pub fn where_gt<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.map_builder(|q| q.where_gt(column, value))
    }

    pub fn where_gte<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.map_builder(|q| q.where_gte(column, value))
    }

    pub fn where_lt<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.map_builder(|q| q.where_lt(column, value))
    }

    pub fn where_lte<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.map_builder(|q| q.where_lte(column, value))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.map_builder(|q| q.where_like(column, pattern))
    }

    pub fn where_not_like(self, column: &str, pattern: &str) -> Self {
        self.map_builder(|q| q.where_not_like(column, pattern))
    }

    pub fn where_condition<T: Into<DatabaseValue>>(self, column: &str, operator: &str, value: T) -> Self {
        self.map_builder(|q| q.where_condition(column, operator, value))
    }

    pub fn where_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.map_builder(|q| q.where_in(column, values))
    }

    pub fn where_not_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.map_builder(|q| q.where_not_in(column, values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.map_builder(|q| q.where_null(column))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.map_builder(|q| q.where_not_null(column))
    }

    pub fn where_between<T: Into<DatabaseValue>>(self, column: &str, low: T, high: T) -> Self {
        self.map_builder(|q| q.where_between(column, low, high))
    }

    pub fn join(self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.map_builder(|q| q.join(table, left_col, right_col))
    }

    pub fn left_join(self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.map_builder(|q| q.left_join(table, left_col, right_col))
    }

    pub fn order_by(self, column: &str) -> Self {
        self.map_builder(|q| q.order_by(column))
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.map_builder(|q| q.order_by_desc(column))
    }

    /// Newest first by the creation timestamp
    pub fn latest(self) -> Self {
        let column = self.model.created_at_column().to_string();
        self.latest_by(&column)
    }

    pub fn latest_by(self, column: &str) -> Self {
        let column = self.qualify(column);
        self.order_by_desc(&column)
    }

    pub fn oldest(self) -> Self {
        let column = self.model.created_at_column().to_string();
        self.oldest_by(&column)
    }

    pub fn oldest_by(self, column: &str) -> Self {
        let column = self.qualify(column);
        self.order_by(&column)
    }

    pub fn order_by_direction(self, column: &str, direction: OrderDirection) -> Self {
        self.map_builder(|q| q.push_order(column, direction))
    }

    pub fn limit(self, count: i64) -> Self {
        self.map_builder(|q| q.limit(count))
    }

    pub fn offset(self, count: i64) -> Self {
        self.map_builder(|q| q.offset(count))
    }

    pub fn for_page(self, page: i64, per_page: i64) -> Self {
        self.map_builder(|q| q.for_page(page, per_page))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ModelError;
    use crate::query::{OrderDirection, QueryOperator};
    use crate::testing::blog_context;

    #[test]
    fn test_global_scopes_apply_on_terminal_builder_only() {
        let (ctx, _) = blog_context();
        let query = ctx.query("Post").unwrap().where_eq("posts.user_id", 1);

        assert_eq!(query.builder().where_conditions().len(), 1);
        let scoped = query.to_builder();
        assert_eq!(scoped.where_conditions().len(), 2);
        assert_eq!(scoped.where_conditions()[1].column, "posts.deleted_at");
        assert_eq!(scoped.where_conditions()[1].operator, QueryOperator::IsNull);

        assert_eq!(query.clone().with_trashed().to_builder().where_conditions().len(), 1);
        assert_eq!(query.with_trashed().without_trashed().to_builder().where_conditions().len(), 2);
    }

    #[test]
    fn test_only_trashed() {
        let (ctx, _) = blog_context();
        let builder = ctx.query("Post").unwrap().only_trashed().to_builder();
        assert_eq!(builder.where_conditions().len(), 1);
        assert_eq!(builder.where_conditions()[0].operator, QueryOperator::IsNotNull);
    }

    #[test]
    fn test_local_scopes() {
        let (ctx, _) = blog_context();
        let query = ctx
            .query("Post")
            .unwrap()
            .scope("titled", &["Hello".into()])
            .unwrap();
        assert_eq!(query.builder().where_conditions()[0].column, "posts.title");

        let missing = ctx.query("Post").unwrap().scope("popular", &[]);
        match missing {
            Err(ModelError::ScopeNotFound { model, scope }) => {
                assert_eq!(model, "Post");
                assert_eq!(scope, "popular");
            }
            _ => panic!("expected ScopeNotFound"),
        }
    }

    #[test]
    fn test_latest_and_oldest_order_by_creation() {
        let (ctx, _) = blog_context();
        let latest = ctx.query("User").unwrap().latest();
        assert_eq!(latest.builder().order_clauses()[0].0, "users.created_at");
        assert_eq!(latest.builder().order_clauses()[0].1, OrderDirection::Desc);

        let oldest = ctx.query("Post").unwrap().aliased("parent_posts").oldest_by("id");
        assert_eq!(oldest.builder().order_clauses()[0].0, "parent_posts.id");
        assert_eq!(oldest.builder().order_clauses()[0].1, OrderDirection::Asc);
    }

    #[test]
    fn test_select_qualified_uses_alias() {
        let (ctx, _) = blog_context();
        let query = ctx.query("Post").unwrap().aliased("parent_posts").select_qualified(&["id", "users.name"]);
        let fields = query.builder().select_fields();
        assert_eq!(fields[0].expression, "parent_posts.id");
        assert_eq!(fields[1].expression, "users.name");
    }
}
