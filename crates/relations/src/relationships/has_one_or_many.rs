//! HasOne / HasMany - the related table holds a foreign key to the parent

use async_trait::async_trait;

use crate::backends::Row;
use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, RelationValue};
use crate::query::ModelQuery;

use super::base::{collect_keys, group_by_key, RelationBase};
use super::{JoinKeys, Relation, RelationDefinition, RelationKind};

pub struct HasOneOrMany {
    base: RelationBase,
    foreign_key: String,
    local_key: String,
}

impl HasOneOrMany {
    pub(crate) fn new(base: RelationBase) -> ModelResult<Self> {
        let (foreign_key, local_key) = match &base.definition.keys {
            JoinKeys::Direct { foreign_key, local_key } => (foreign_key.clone(), local_key.clone()),
            _ => {
                return Err(ModelError::Relationship(format!(
                    "relation '{}' is not a has-one/has-many relation",
                    base.definition.name
                )))
            }
        };
        Ok(Self {
            base,
            foreign_key,
            local_key,
        })
    }

    pub fn is_many(&self) -> bool {
        self.base.definition.kind == RelationKind::HasMany
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    fn empty_value(&self, parent: &Model) -> RelationValue {
        if self.is_many() {
            RelationValue::Many(Collection::default())
        } else {
            let parent_key = parent.attribute(&self.local_key);
            RelationValue::One(self.base.default_model(Some((&self.foreign_key, parent_key))))
        }
    }

    /// Point `model` at `parent` and save it
    pub async fn save(&self, parent: &Model, model: &mut Model) -> ModelResult<()> {
        model.set_attribute(&self.foreign_key, parent.attribute(&self.local_key));
        self.base.ctx.save(model).await
    }

    /// Insert a related model belonging to `parent`
    pub async fn create(&self, parent: &Model, attributes: Row) -> ModelResult<Model> {
        let mut model = Model::new(self.base.related.clone());
        model.fill(attributes);
        self.save(parent, &mut model).await?;
        Ok(model)
    }

    pub async fn create_many(&self, parent: &Model, records: Vec<Row>) -> ModelResult<Collection> {
        let mut created = Vec::with_capacity(records.len());
        for attributes in records {
            created.push(self.create(parent, attributes).await?);
        }
        Ok(Collection::new(created))
    }
}

#[async_trait]
impl Relation for HasOneOrMany {
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
        (self.base.qualify(&self.foreign_key), self.local_key.clone())
    }

    fn add_constraints(&mut self, parent: &Model) {
        let column = self.base.qualify(&self.foreign_key);
        let key = parent.attribute(&self.local_key);
        let query = self.base.query.clone();
        self.base.query = query.where_eq(&column, key).where_not_null(&column);
    }

    fn add_eager_constraints(&mut self, models: &[Model]) {
        let column = self.base.qualify(&self.foreign_key);
        let keys = collect_keys(models, &self.local_key);
        let query = self.base.query.clone();
        self.base.query = query.where_in(&column, keys);
    }

    fn init_relation(&self, models: &mut [Model]) {
        for model in models.iter_mut() {
            let value = self.empty_value(model);
            model.set_relation(self.name(), value);
        }
    }

    fn match_results(&self, models: &mut [Model], results: Collection) {
        let foreign_key = self.foreign_key.clone();
        let dictionary = group_by_key(results, |child| child.attribute(&foreign_key));

        for model in models.iter_mut() {
            let matched = model
                .attribute(&self.local_key)
                .dictionary_key()
                .and_then(|key| dictionary.get(&key));

            let value = match matched {
                Some(children) if self.is_many() => RelationValue::Many(Collection::new(children.clone())),
                Some(children) => RelationValue::One(children.first().cloned().map(Box::new)),
                None => self.empty_value(model),
            };
            model.set_relation(self.name(), value);
        }
    }

    async fn get(&self) -> ModelResult<Collection> {
        self.base.query.get().await
    }

    async fn get_results(&self, parent: &Model) -> ModelResult<RelationValue> {
        if parent.attribute(&self.local_key).is_null() {
            return Ok(self.empty_value(parent));
        }

        let results = self.get().await?;
        if self.is_many() {
            return Ok(RelationValue::Many(results));
        }
        match results.into_iter().next() {
            Some(model) => Ok(RelationValue::One(Some(Box::new(model)))),
            None => Ok(self.empty_value(parent)),
        }
    }
}
