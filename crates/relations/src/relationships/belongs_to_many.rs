//! BelongsToMany - many-to-many through a pivot table

use async_trait::async_trait;
use tracing::debug;

use crate::backends::{DatabaseValue, Row};
use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, RelationValue};
use crate::query::{ModelQuery, QueryBuilder};

use super::base::{collect_keys, group_by_key, RelationBase};
use super::{JoinKeys, Pivot, PivotDefinition, Relation, RelationDefinition};

/// Prefix pivot columns are selected under
const PIVOT_PREFIX: &str = "pivot_";

pub struct BelongsToMany {
    pub(super) base: RelationBase,
    pub(super) pivot: PivotDefinition,
    /// Parent key value once scoped to a single parent
    pub(super) parent_key: Option<DatabaseValue>,
}

impl BelongsToMany {
    pub(crate) fn new(base: RelationBase) -> ModelResult<Self> {
        let pivot = match &base.definition.keys {
            JoinKeys::Pivot(pivot) => pivot.clone(),
            _ => {
                return Err(ModelError::Relationship(format!(
                    "relation '{}' is not a many-to-many relation",
                    base.definition.name
                )))
            }
        };

        let related_key = base.qualify(&pivot.related_key);
        let pivot_key = pivot.qualify(&pivot.related_pivot_key);
        let mut query = base.query.clone().join(&pivot.table, &related_key, &pivot_key);
        for condition in &pivot.wheres {
            let condition = condition.clone();
            query = query.map_builder(|q| q.push_where(condition));
        }
        for (column, direction) in &pivot.order {
            query = query.order_by_direction(column, direction.clone());
        }

        let mut base = base;
        base.query = query;
        Ok(Self {
            base,
            pivot,
            parent_key: None,
        })
    }

    pub fn pivot_definition(&self) -> &PivotDefinition {
        &self.pivot
    }

    pub fn table(&self) -> &str {
        &self.pivot.table
    }

    pub fn accessor(&self) -> &str {
        &self.pivot.accessor
    }

    fn pivot_columns(&self) -> Vec<String> {
        let mut columns = vec![self.pivot.foreign_pivot_key.clone(), self.pivot.related_pivot_key.clone()];
        for column in &self.pivot.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }

    /// Related columns plus every pivot column under its `pivot_` alias
    fn select_with_pivot(&self, query: ModelQuery) -> ModelQuery {
        let mut query = query;
        if query.builder().select_fields().is_empty() {
            let all = query.qualify("*");
            query = query.select(&[all.as_str()]);
        }
        let aliased: Vec<String> = self
            .pivot_columns()
            .iter()
            .map(|column| format!("{} as {}{}", self.pivot.qualify(column), PIVOT_PREFIX, column))
            .collect();
        let aliased: Vec<&str> = aliased.iter().map(String::as_str).collect();
        query.add_select(&aliased)
    }

    /// Move the `pivot_` columns of each model into a pivot record
    fn hydrate_pivots(&self, models: &mut [Model]) {
        let columns = self.pivot_columns();
        for model in models.iter_mut() {
            let mut attributes = Row::new();
            let mut remaining = model.attributes().clone();
            for column in &columns {
                let alias = format!("{}{}", PIVOT_PREFIX, column);
                if let Some(value) = remaining.remove(&alias) {
                    attributes.insert(column.clone(), value);
                }
            }
            let mut hydrated = model.new_instance(remaining, true);
            hydrated.set_relation(&self.pivot.accessor, RelationValue::Pivot(Pivot::new(&self.pivot.table, attributes)));
            *model = hydrated;
        }
    }

    /// Base query over the pivot table for the scoped parent
    pub(super) fn pivot_query(&self) -> ModelResult<QueryBuilder> {
        let parent_key = self.parent_key.clone().ok_or_else(|| {
            ModelError::Relationship(format!(
                "relation '{}' must be scoped to a parent before writing pivot rows",
                self.base.definition.name
            ))
        })?;
        if parent_key.is_null() {
            return Err(ModelError::Relationship(format!(
                "relation '{}': parent has no '{}' value",
                self.base.definition.name, self.pivot.parent_key
            )));
        }

        let mut query = QueryBuilder::table(&self.pivot.table)
            .where_eq(&self.pivot.qualify(&self.pivot.foreign_pivot_key), parent_key);
        for condition in &self.pivot.wheres {
            query = query.push_where(condition.clone());
        }
        Ok(query)
    }
}

#[async_trait]
impl Relation for BelongsToMany {
    fn definition(&self) -> &RelationDefinition {
        &self.base.definition
    }

    fn query(&self) -> &ModelQuery {
        &self.base.query
    }

    fn query_mut(&mut self) -> &mut ModelQuery {
        &mut self.base.query
    }

    fn match_columns(&self) -> (String, String) {
        (self.pivot.qualify(&self.pivot.foreign_pivot_key), self.pivot.parent_key.clone())
    }

    fn add_constraints(&mut self, parent: &Model) {
        let key = parent.attribute(&self.pivot.parent_key);
        let column = self.pivot.qualify(&self.pivot.foreign_pivot_key);
        let query = self.base.query.clone();
        self.base.query = query.where_eq(&column, key.clone());
        self.parent_key = Some(key);
    }

    fn add_eager_constraints(&mut self, models: &[Model]) {
        let column = self.pivot.qualify(&self.pivot.foreign_pivot_key);
        let keys = collect_keys(models, &self.pivot.parent_key);
        let query = self.base.query.clone();
        self.base.query = query.where_in(&column, keys);
    }

    fn init_relation(&self, models: &mut [Model]) {
        for model in models.iter_mut() {
            model.set_relation(self.name(), RelationValue::Many(Collection::default()));
        }
    }

    fn match_results(&self, models: &mut [Model], results: Collection) {
        let accessor = self.pivot.accessor.clone();
        let foreign_pivot_key = self.pivot.foreign_pivot_key.clone();
        let dictionary = group_by_key(results, |related| {
            related
                .pivot_as(&accessor)
                .and_then(|pivot| pivot.get(&foreign_pivot_key).cloned())
                .unwrap_or(DatabaseValue::Null)
        });

        for model in models.iter_mut() {
            let related = model
                .attribute(&self.pivot.parent_key)
                .dictionary_key()
                .and_then(|key| dictionary.get(&key))
                .cloned()
                .unwrap_or_default();
            model.set_relation(self.name(), RelationValue::Many(Collection::new(related)));
        }
    }

    async fn get(&self) -> ModelResult<Collection> {
        let query = self.select_with_pivot(self.base.query.clone());
        let mut models = query.get_models().await?;
        self.hydrate_pivots(&mut models);
        debug!(relation = %self.name(), pivot = %self.pivot.table, count = models.len(), "fetched many-to-many results");

        if !models.is_empty() {
            query.eager_load_relations(&mut models).await?;
        }
        Ok(Collection::new(models))
    }

    async fn get_results(&self, parent: &Model) -> ModelResult<RelationValue> {
        if parent.attribute(&self.pivot.parent_key).is_null() {
            return Ok(RelationValue::Many(Collection::default()));
        }
        Ok(RelationValue::Many(self.get().await?))
    }
}

/// Attribute rows for a pivot insert
pub(super) fn pivot_row(
    pivot: &PivotDefinition,
    parent_key: &DatabaseValue,
    related_key: DatabaseValue,
    attributes: &Row,
) -> Row {
    let mut row = attributes.clone();
    row.insert(pivot.foreign_pivot_key.clone(), parent_key.clone());
    row.insert(pivot.related_pivot_key.clone(), related_key);
    if pivot.has_timestamps() {
        let now = DatabaseValue::now();
        row.entry("created_at".to_string()).or_insert_with(|| now.clone());
        row.entry("updated_at".to_string()).or_insert(now);
    }
    row
}
