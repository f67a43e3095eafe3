//! Relation Aggregates - per-parent counts and column aggregates of a relation
//!
//! Like eager loading, each aggregate costs one query for the whole batch of
//! parents. The result lands in a plain attribute on every parent, e.g.
//! `posts_count`, and parents without related rows get the empty value.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::backends::DatabaseValue;
use crate::error::ModelResult;
use crate::model::Model;
use crate::query::existence::MATCH_KEY;
use crate::query::{ModelQuery, QueryBuilder, SelectColumn};
use crate::relationships::{make_relation, Relation};

use super::spec::Constraint;

const AGGREGATE_VALUE: &str = "elif_aggregate_value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Exists,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Exists => "exists",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    fn needs_column(&self) -> bool {
        !matches!(self, AggregateFunction::Count | AggregateFunction::Exists)
    }

    /// Fold the related values of one parent. Nulls are skipped the way SQL
    /// aggregates skip them.
    pub(crate) fn apply(&self, values: &[DatabaseValue]) -> DatabaseValue {
        let present: Vec<&DatabaseValue> = values.iter().filter(|value| !value.is_null()).collect();
        match self {
            AggregateFunction::Count => DatabaseValue::Int64(values.len() as i64),
            AggregateFunction::Exists => DatabaseValue::Bool(!values.is_empty()),
            AggregateFunction::Sum if present.is_empty() => DatabaseValue::Null,
            AggregateFunction::Sum => match present.iter().map(|value| value.as_i64()).sum::<Option<i64>>() {
                Some(total) => DatabaseValue::Int64(total),
                None => DatabaseValue::Float64(present.iter().filter_map(|value| value.as_f64()).sum()),
            },
            AggregateFunction::Avg => {
                let numbers: Vec<f64> = present.iter().filter_map(|value| value.as_f64()).collect();
                if numbers.is_empty() {
                    DatabaseValue::Null
                } else {
                    DatabaseValue::Float64(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggregateFunction::Min => extreme(&present, Ordering::Less),
            AggregateFunction::Max => extreme(&present, Ordering::Greater),
        }
    }
}

fn extreme(values: &[&DatabaseValue], wanted: Ordering) -> DatabaseValue {
    values
        .iter()
        .copied()
        .fold(None::<&DatabaseValue>, |best, value| match best {
            Some(best) if value.compare(best) != Some(wanted) => Some(best),
            _ => Some(value),
        })
        .cloned()
        .unwrap_or(DatabaseValue::Null)
}

/// One aggregate requested with `with_count`, `with_sum` and friends
#[derive(Clone)]
pub(crate) struct AggregateLoad {
    pub(crate) relation: String,
    pub(crate) alias: String,
    pub(crate) function: AggregateFunction,
    pub(crate) column: Option<String>,
    pub(crate) constraint: Option<Constraint>,
}

impl AggregateLoad {
    /// `relation` may name its output attribute: `"posts as total"`
    pub(crate) fn new(
        relation: &str,
        function: AggregateFunction,
        column: Option<&str>,
        constraint: Option<Constraint>,
    ) -> Self {
        let parsed = SelectColumn::parse(relation);
        let alias = parsed.alias.clone().unwrap_or_else(|| match column {
            Some(column) if function.needs_column() => {
                format!("{}_{}_{}", parsed.expression, function.name(), column.replace('.', "_"))
            }
            _ => format!("{}_{}", parsed.expression, function.name()),
        });
        Self {
            relation: parsed.expression,
            alias,
            function,
            column: column.map(str::to_string),
            constraint,
        }
    }
}

impl ModelQuery {
    /// Load `{relation}_count` onto every fetched parent
    pub fn with_count(self, relations: &[&str]) -> Self {
        relations
            .iter()
            .fold(self, |query, relation| query.with_aggregate(relation, AggregateFunction::Count, None))
    }

    /// Count only the related rows matching `constraint`
    pub fn with_count_where<F>(mut self, relation: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let constraint: Constraint = Arc::new(constraint);
        self.aggregates
            .push(AggregateLoad::new(relation, AggregateFunction::Count, None, Some(constraint)));
        self
    }

    /// Load `{relation}_exists` as a boolean onto every fetched parent
    pub fn with_exists(self, relations: &[&str]) -> Self {
        relations
            .iter()
            .fold(self, |query, relation| query.with_aggregate(relation, AggregateFunction::Exists, None))
    }

    pub fn with_sum(self, relation: &str, column: &str) -> Self {
        self.with_aggregate(relation, AggregateFunction::Sum, Some(column))
    }

    pub fn with_avg(self, relation: &str, column: &str) -> Self {
        self.with_aggregate(relation, AggregateFunction::Avg, Some(column))
    }

    pub fn with_min(self, relation: &str, column: &str) -> Self {
        self.with_aggregate(relation, AggregateFunction::Min, Some(column))
    }

    pub fn with_max(self, relation: &str, column: &str) -> Self {
        self.with_aggregate(relation, AggregateFunction::Max, Some(column))
    }

    pub fn with_aggregate(mut self, relation: &str, function: AggregateFunction, column: Option<&str>) -> Self {
        self.aggregates.push(AggregateLoad::new(relation, function, column, None));
        self
    }
}

/// Compute every aggregate of `query` for `models`, one query per aggregate.
///
/// Relations are resolved first, so an unknown name fails before any query.
pub(crate) async fn load_aggregates(query: &ModelQuery, models: &mut [Model]) -> ModelResult<()> {
    if query.aggregates.is_empty() {
        return Ok(());
    }

    let mut relations: Vec<Box<dyn Relation>> = Vec::with_capacity(query.aggregates.len());
    for aggregate in &query.aggregates {
        let mut relation = make_relation(query.context(), query.model(), &aggregate.relation)?;
        if let Some(constraint) = &aggregate.constraint {
            relation.constrain(&**constraint);
        }
        relations.push(relation);
    }

    if models.is_empty() {
        return Ok(());
    }

    let mut lookups: Vec<QueryBuilder> = Vec::with_capacity(relations.len());
    for (aggregate, relation) in query.aggregates.iter().zip(relations.iter_mut()) {
        relation.add_eager_constraints(models);
        let (related_column, _) = relation.match_columns();

        let mut columns = vec![format!("{} as {}", related_column, MATCH_KEY)];
        if let (Some(column), true) = (&aggregate.column, aggregate.function.needs_column()) {
            columns.push(format!("{} as {}", relation.query().qualify(column), AGGREGATE_VALUE));
        }
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        lookups.push(relation.query().clone().select(&columns).resolve_builder().await?);
    }

    debug!(
        model = %query.model().name(),
        parents = models.len(),
        aggregates = lookups.len(),
        "loading relation aggregates"
    );

    let executor = query.context().executor();
    let results = if query.context().config().concurrent_eager_loading {
        try_join_all(lookups.iter().map(|lookup| executor.select(lookup))).await?
    } else {
        let mut results = Vec::with_capacity(lookups.len());
        for lookup in &lookups {
            results.push(executor.select(lookup).await?);
        }
        results
    };

    for ((aggregate, relation), rows) in query.aggregates.iter().zip(&relations).zip(results) {
        let (_, parent_column) = relation.match_columns();
        let mut grouped: HashMap<String, Vec<DatabaseValue>> = HashMap::new();
        for mut row in rows {
            let Some(key) = row.get(MATCH_KEY).and_then(DatabaseValue::dictionary_key) else {
                continue;
            };
            let value = row.remove(AGGREGATE_VALUE).unwrap_or(DatabaseValue::Null);
            grouped.entry(key).or_default().push(value);
        }

        for model in models.iter_mut() {
            let values = model
                .attribute(&parent_column)
                .dictionary_key()
                .and_then(|key| grouped.get(&key))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            model.set_loaded_attribute(&aggregate.alias, aggregate.function.apply(values));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_explicit_aliases() {
        assert_eq!(AggregateLoad::new("posts", AggregateFunction::Count, None, None).alias, "posts_count");
        assert_eq!(AggregateLoad::new("roles", AggregateFunction::Exists, None, None).alias, "roles_exists");
        assert_eq!(
            AggregateLoad::new("posts", AggregateFunction::Max, Some("id"), None).alias,
            "posts_max_id"
        );
        let named = AggregateLoad::new("posts as total", AggregateFunction::Count, None, None);
        assert_eq!(named.relation, "posts");
        assert_eq!(named.alias, "total");
    }

    #[test]
    fn test_functions_skip_nulls() {
        let values = vec![DatabaseValue::Int64(4), DatabaseValue::Null, DatabaseValue::Int32(2)];
        assert_eq!(AggregateFunction::Count.apply(&values), DatabaseValue::Int64(3));
        assert_eq!(AggregateFunction::Sum.apply(&values), DatabaseValue::Int64(6));
        assert_eq!(AggregateFunction::Avg.apply(&values), DatabaseValue::Float64(3.0));
        assert_eq!(AggregateFunction::Min.apply(&values), DatabaseValue::Int32(2));
        assert_eq!(AggregateFunction::Max.apply(&values), DatabaseValue::Int64(4));

        assert_eq!(AggregateFunction::Sum.apply(&[]), DatabaseValue::Null);
        assert_eq!(AggregateFunction::Exists.apply(&[]), DatabaseValue::Bool(false));
        assert_eq!(
            AggregateFunction::Sum.apply(&[DatabaseValue::Float64(1.5), DatabaseValue::Int64(1)]),
            DatabaseValue::Float64(2.5)
        );
    }
}
