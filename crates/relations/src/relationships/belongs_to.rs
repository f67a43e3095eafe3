//! BelongsTo - the parent holds a foreign key to the owning model

use std::collections::HashMap;

use async_trait::async_trait;

use crate::backends::DatabaseValue;
use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, RelationValue};
use crate::query::ModelQuery;

use super::base::{collect_keys, RelationBase};
use super::{JoinKeys, Relation, RelationDefinition};

pub struct BelongsTo {
    base: RelationBase,
    foreign_key: String,
    owner_key: String,
}

impl BelongsTo {
    pub(crate) fn new(base: RelationBase) -> ModelResult<Self> {
        let (foreign_key, owner_key) = match &base.definition.keys {
            JoinKeys::Owner { foreign_key, owner_key } => (foreign_key.clone(), owner_key.clone()),
            _ => {
                return Err(ModelError::Relationship(format!(
                    "relation '{}' is not a belongs-to relation",
                    base.definition.name
                )))
            }
        };
        Ok(Self {
            base,
            foreign_key,
            owner_key,
        })
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    fn empty_value(&self) -> RelationValue {
        RelationValue::One(self.base.default_model(None))
    }

    /// Point `child` at `owner` and cache the owner in the relation slot
    pub fn associate(&self, child: &mut Model, owner: &Model) {
        child.set_attribute(&self.foreign_key, owner.attribute(&self.owner_key));
        child.set_relation(self.name(), RelationValue::One(Some(Box::new(owner.clone()))));
    }

    /// Clear the foreign key of `child`
    pub fn dissociate(&self, child: &mut Model) {
        child.set_attribute(&self.foreign_key, DatabaseValue::Null);
        child.set_relation(self.name(), RelationValue::One(None));
    }
}

#[async_trait]
impl Relation for BelongsTo {
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
        (self.base.qualify(&self.owner_key), self.foreign_key.clone())
    }

    fn add_constraints(&mut self, parent: &Model) {
        let column = self.base.qualify(&self.owner_key);
        let key = parent.attribute(&self.foreign_key);
        let query = self.base.query.clone();
        self.base.query = query.where_eq(&column, key);
    }

    fn add_eager_constraints(&mut self, models: &[Model]) {
        let column = self.base.qualify(&self.owner_key);
        let keys = collect_keys(models, &self.foreign_key);
        let query = self.base.query.clone();
        self.base.query = query.where_in(&column, keys);
    }

    fn init_relation(&self, models: &mut [Model]) {
        for model in models.iter_mut() {
            model.set_relation(self.name(), self.empty_value());
        }
    }

    fn match_results(&self, models: &mut [Model], results: Collection) {
        // Later owners with the same key replace earlier ones
        let dictionary: HashMap<String, Model> = results
            .into_iter()
            .filter_map(|owner| {
                owner
                    .attribute(&self.owner_key)
                    .dictionary_key()
                    .map(|key| (key, owner))
            })
            .collect();

        for model in models.iter_mut() {
            let owner = model
                .attribute(&self.foreign_key)
                .dictionary_key()
                .and_then(|key| dictionary.get(&key));
            let value = match owner {
                Some(owner) => RelationValue::One(Some(Box::new(owner.clone()))),
                None => self.empty_value(),
            };
            model.set_relation(self.name(), value);
        }
    }

    async fn get(&self) -> ModelResult<Collection> {
        self.base.query.get().await
    }

    async fn get_results(&self, parent: &Model) -> ModelResult<RelationValue> {
        if parent.attribute(&self.foreign_key).is_null() {
            return Ok(self.empty_value());
        }
        match self.get().await?.into_iter().next() {
            Some(owner) => Ok(RelationValue::One(Some(Box::new(owner)))),
            None => Ok(self.empty_value()),
        }
    }
}
