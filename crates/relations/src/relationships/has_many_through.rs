//! HasManyThrough / HasOneThrough - related rows reached across an intermediate table

use std::sync::Arc;

use async_trait::async_trait;

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelDefinition, RelationValue};
use crate::query::ModelQuery;

use super::base::{collect_keys, group_by_key, RelationBase};
use super::{JoinKeys, Relation, RelationDefinition, RelationKind, ThroughDefinition};

/// Column carrying the far parent's key on each fetched row
pub const THROUGH_KEY: &str = "elif_through_key";

pub struct HasManyThrough {
    base: RelationBase,
    keys: ThroughDefinition,
    through: Arc<ModelDefinition>,
    /// Name the intermediate table is referenced by in the related query
    through_ref: String,
}

impl HasManyThrough {
    pub(crate) fn new(base: RelationBase) -> ModelResult<Self> {
        let keys = match &base.definition.keys {
            JoinKeys::Through(keys) => keys.clone(),
            _ => {
                return Err(ModelError::Relationship(format!(
                    "relation '{}' is not a through relation",
                    base.definition.name
                )))
            }
        };
        let through = base.ctx.model(&keys.through)?;

        let related_ref = base
            .query
            .builder()
            .from_table()
            .map(|table| table.reference_name().to_string())
            .unwrap_or_else(|| base.related.table().to_string());
        let (join_table, through_ref) = if through.table() == related_ref || through.table() == base.related.table() {
            let alias = format!("{}_through", base.definition.name);
            (format!("{} as {}", through.table(), alias), alias)
        } else {
            (through.table().to_string(), through.table().to_string())
        };

        let second_local = format!("{}.{}", through_ref, keys.second_local_key);
        let second_key = base.qualify(&keys.second_key);
        let mut query = base.query.clone().join(&join_table, &second_local, &second_key);
        if let Some(deleted_at) = through.deleted_at_column() {
            query = query.where_null(&format!("{}.{}", through_ref, deleted_at));
        }

        let mut base = base;
        base.query = query;
        Ok(Self {
            base,
            keys,
            through,
            through_ref,
        })
    }

    pub fn is_one(&self) -> bool {
        self.base.definition.kind == RelationKind::HasOneThrough
    }

    pub fn through_model(&self) -> &Arc<ModelDefinition> {
        &self.through
    }

    fn first_key_column(&self) -> String {
        format!("{}.{}", self.through_ref, self.keys.first_key)
    }

    fn empty_value(&self) -> RelationValue {
        if self.is_one() {
            RelationValue::One(self.base.default_model(None))
        } else {
            RelationValue::Many(Collection::default())
        }
    }
}

#[async_trait]
impl Relation for HasManyThrough {
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
        (self.first_key_column(), self.keys.local_key.clone())
    }

    fn add_constraints(&mut self, parent: &Model) {
        let column = self.first_key_column();
        let key = parent.attribute(&self.keys.local_key);
        let query = self.base.query.clone();
        self.base.query = query.where_eq(&column, key);
    }

    fn add_eager_constraints(&mut self, models: &[Model]) {
        let column = self.first_key_column();
        let keys = collect_keys(models, &self.keys.local_key);
        let query = self.base.query.clone();
        self.base.query = query.where_in(&column, keys);
    }

    fn init_relation(&self, models: &mut [Model]) {
        for model in models.iter_mut() {
            model.set_relation(self.name(), self.empty_value());
        }
    }

    fn match_results(&self, models: &mut [Model], results: Collection) {
        let dictionary = group_by_key(results, |related| related.attribute(THROUGH_KEY));

        for model in models.iter_mut() {
            let matched = model
                .attribute(&self.keys.local_key)
                .dictionary_key()
                .and_then(|key| dictionary.get(&key));
            let value = match matched {
                Some(related) if self.is_one() => RelationValue::One(related.first().cloned().map(Box::new)),
                Some(related) => RelationValue::Many(Collection::new(related.clone())),
                None => self.empty_value(),
            };
            model.set_relation(self.name(), value);
        }
    }

    async fn get(&self) -> ModelResult<Collection> {
        let mut query = self.base.query.clone();
        if query.builder().select_fields().is_empty() {
            let all = query.qualify("*");
            query = query.select(&[all.as_str()]);
        }
        let through_key = format!("{} as {}", self.first_key_column(), THROUGH_KEY);
        query.add_select(&[through_key.as_str()]).get().await
    }

    async fn get_results(&self, parent: &Model) -> ModelResult<RelationValue> {
        if parent.attribute(&self.keys.local_key).is_null() {
            return Ok(self.empty_value());
        }
        let results = self.get().await?;
        if !self.is_one() {
            return Ok(RelationValue::Many(results));
        }
        match results.into_iter().next() {
            Some(model) => Ok(RelationValue::One(Some(Box::new(model)))),
            None => Ok(self.empty_value()),
        }
    }
}
