//! Relation Existence - filter parents by how many related rows they have
//!
//! Each filter is resolved with one query on the relation, projecting the
//! column that holds the parent key. The counted keys then become an `IN` (or
//! `NOT IN`) condition on the parent's own key column.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::backends::DatabaseValue;
use crate::error::ModelResult;
use crate::loading::Constraint;
use crate::relationships::make_relation;

use super::builder::QueryBuilder;
use super::model_query::ModelQuery;
use super::types::{QueryOperator, WhereCondition, WhereGroup};

/// Output name of the projected parent key in relation lookups
pub(crate) const MATCH_KEY: &str = "elif_match_key";

/// How a filter combines with the rest of the WHERE clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereBoolean {
    And,
    Or,
}

#[derive(Clone)]
pub(crate) struct ExistenceFilter {
    pub(crate) relation: String,
    pub(crate) operator: QueryOperator,
    pub(crate) count: u64,
    pub(crate) boolean: WhereBoolean,
    pub(crate) constraint: Option<Constraint>,
}

impl ExistenceFilter {
    /// Whether a parent with `count` related rows passes
    fn accepts(&self, count: u64) -> bool {
        match self.operator {
            QueryOperator::Equal => count == self.count,
            QueryOperator::NotEqual => count != self.count,
            QueryOperator::GreaterThan => count > self.count,
            QueryOperator::LessThan => count < self.count,
            QueryOperator::LessThanOrEqual => count <= self.count,
            _ => count >= self.count,
        }
    }
}

impl ModelQuery {
    /// Parents with at least one related row; `relation` may be a dotted path
    pub fn has(self, relation: &str) -> Self {
        self.push_existence(relation, QueryOperator::GreaterThanOrEqual, 1, WhereBoolean::And, None)
    }

    /// Parents whose related row count satisfies `operator count`, e.g.
    /// `has_count("posts", ">=", 3)`
    pub fn has_count(self, relation: &str, operator: &str, count: u64) -> Self {
        let operator = QueryOperator::parse(operator).unwrap_or(QueryOperator::GreaterThanOrEqual);
        self.push_existence(relation, operator, count, WhereBoolean::And, None)
    }

    pub fn or_has(self, relation: &str) -> Self {
        self.push_existence(relation, QueryOperator::GreaterThanOrEqual, 1, WhereBoolean::Or, None)
    }

    pub fn doesnt_have(self, relation: &str) -> Self {
        self.push_existence(relation, QueryOperator::LessThan, 1, WhereBoolean::And, None)
    }

    pub fn or_doesnt_have(self, relation: &str) -> Self {
        self.push_existence(relation, QueryOperator::LessThan, 1, WhereBoolean::Or, None)
    }

    /// Parents with at least one related row matching `constraint`. For a
    /// dotted path the constraint applies to the last relation.
    pub fn where_has<F>(self, relation: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let constraint: Constraint = Arc::new(constraint);
        self.push_existence(relation, QueryOperator::GreaterThanOrEqual, 1, WhereBoolean::And, Some(constraint))
    }

    pub fn or_where_has<F>(self, relation: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let constraint: Constraint = Arc::new(constraint);
        self.push_existence(relation, QueryOperator::GreaterThanOrEqual, 1, WhereBoolean::Or, Some(constraint))
    }

    /// Parents with no related row matching `constraint`
    pub fn where_doesnt_have<F>(self, relation: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let constraint: Constraint = Arc::new(constraint);
        self.push_existence(relation, QueryOperator::LessThan, 1, WhereBoolean::And, Some(constraint))
    }

    pub fn or_where_doesnt_have<F>(self, relation: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let constraint: Constraint = Arc::new(constraint);
        self.push_existence(relation, QueryOperator::LessThan, 1, WhereBoolean::Or, Some(constraint))
    }

    /// Record a filter. `"a.b"` becomes "has some `a` that has `b`"; asking for
    /// no `b` at all becomes "has no `a` that has any `b`".
    pub(crate) fn push_existence(
        mut self,
        relation: &str,
        operator: QueryOperator,
        count: u64,
        boolean: WhereBoolean,
        constraint: Option<Constraint>,
    ) -> Self {
        let Some((first, rest)) = relation.split_once('.') else {
            self.existence.push(ExistenceFilter {
                relation: relation.to_string(),
                operator,
                count,
                boolean,
                constraint,
            });
            return self;
        };

        let none_wanted = operator == QueryOperator::LessThan && count == 1;
        let (outer, inner) = if none_wanted {
            (QueryOperator::LessThan, QueryOperator::GreaterThanOrEqual)
        } else {
            (QueryOperator::GreaterThanOrEqual, operator)
        };
        let inner_count = if none_wanted { 1 } else { count };
        let rest = rest.to_string();
        let nested: Constraint = Arc::new(move |query: ModelQuery| {
            query.push_existence(&rest, inner.clone(), inner_count, WhereBoolean::And, constraint.clone())
        });
        self.push_existence(first, outer, 1, boolean, Some(nested))
    }

    /// The builder a terminal operation executes: the composed query with its
    /// relation filters resolved into key conditions, plus every global scope
    /// not removed.
    ///
    /// `or_*` filters are alternatives to everything else in the WHERE clause.
    /// Global scopes always apply on top.
    pub fn resolve_builder(&self) -> BoxFuture<'_, ModelResult<QueryBuilder>> {
        async move {
            let mut query = self.query.clone();
            let mut alternatives: WhereGroup = Vec::new();
            let mut has_alternatives = false;

            for filter in &self.existence {
                let group = self.existence_group(filter).await?;
                match filter.boolean {
                    WhereBoolean::And => query = and_group(query, group),
                    WhereBoolean::Or => {
                        has_alternatives = true;
                        alternatives.extend(group);
                    }
                }
            }

            if has_alternatives {
                let mut all = if query.where_conditions().is_empty() && query.where_groups().is_empty() {
                    Vec::new()
                } else {
                    query.where_alternatives()
                };
                all.extend(alternatives);
                query.clear_where();
                query = query.where_any(all);
            }

            Ok(self.apply_global_scopes(query))
        }
        .boxed()
    }

    /// Run the relation lookup for one filter and turn it into alternatives
    /// over the parent key column
    async fn existence_group(&self, filter: &ExistenceFilter) -> ModelResult<WhereGroup> {
        let mut relation = make_relation(&self.ctx, &self.model, &filter.relation)?;
        if let Some(constraint) = &filter.constraint {
            relation.constrain(&**constraint);
        }
        let (related_column, parent_column) = relation.match_columns();
        let parent_column = self.qualify(&parent_column);

        let projection = format!("{} as {}", related_column, MATCH_KEY);
        let lookup = relation.query().clone().select(&[projection.as_str()]);
        let builder = lookup.resolve_builder().await?;
        let rows = self.ctx.executor().select(&builder).await?;

        let mut counts: BTreeMap<String, (DatabaseValue, u64)> = BTreeMap::new();
        for mut row in rows {
            let key = row.remove(MATCH_KEY).unwrap_or(DatabaseValue::Null);
            if let Some(dictionary_key) = key.dictionary_key() {
                counts.entry(dictionary_key).or_insert((key, 0)).1 += 1;
            }
        }
        debug!(
            model = %self.model.name(),
            relation = %filter.relation,
            keys = counts.len(),
            "resolved relation existence"
        );

        if filter.accepts(0) {
            // Parents without related rows pass, so exclude the ones that fail
            let failing: Vec<DatabaseValue> = counts
                .into_values()
                .filter(|(_, count)| !filter.accepts(*count))
                .map(|(key, _)| key)
                .collect();
            if failing.is_empty() {
                return Ok(vec![Vec::new()]);
            }
            Ok(vec![
                vec![WhereCondition::unary(&parent_column, QueryOperator::IsNull)],
                vec![WhereCondition::list(&parent_column, QueryOperator::NotIn, failing)],
            ])
        } else {
            let passing: Vec<DatabaseValue> = counts
                .into_values()
                .filter(|(_, count)| filter.accepts(*count))
                .map(|(key, _)| key)
                .collect();
            Ok(vec![vec![WhereCondition::list(&parent_column, QueryOperator::In, passing)]])
        }
    }
}

fn and_group(mut query: QueryBuilder, mut group: WhereGroup) -> QueryBuilder {
    if group.len() == 1 {
        query.where_conditions.append(&mut group[0]);
        query
    } else {
        query.where_any(group)
    }
}
