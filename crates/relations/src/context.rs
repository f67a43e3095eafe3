//! ORM context: the model registry paired with the executor queries run on

use std::sync::Arc;

use tracing::debug;

use crate::backends::QueryExecutor;
use crate::config::OrmConfig;
use crate::error::{ModelError, ModelResult};
use crate::loading::EagerLoadSpec;
use crate::model::{Model, ModelDefinition, ModelRegistry, RelationValue, Timestamped};
use crate::query::ModelQuery;
use crate::relationships::{
    make_relation, make_typed, BelongsTo, BelongsToMany, HasManyThrough, HasOneOrMany, Relation,
};

/// Entry point for queries and relation access.
///
/// Cloning is cheap. To run work inside a transaction, begin it on the
/// backend and thread the transaction executor in with [`with_executor`](Self::with_executor).
#[derive(Clone)]
pub struct OrmContext {
    registry: Arc<ModelRegistry>,
    executor: Arc<dyn QueryExecutor>,
}

impl OrmContext {
    pub fn new(registry: Arc<ModelRegistry>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { registry, executor }
    }

    /// Same registry, different executor (a transaction, a replica)
    pub fn with_executor(&self, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            registry: self.registry.clone(),
            executor,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &OrmConfig {
        self.registry.config()
    }

    pub fn model(&self, name: &str) -> ModelResult<Arc<ModelDefinition>> {
        self.registry.get(name).cloned()
    }

    pub fn query(&self, model: &str) -> ModelResult<ModelQuery> {
        Ok(ModelQuery::new(self.clone(), self.model(model)?))
    }

    /// Unsaved instance of a model type
    pub fn new_model(&self, model: &str) -> ModelResult<Model> {
        Ok(Model::new(self.model(model)?))
    }

    /// Insert a new model or write the changed attributes of an existing one
    pub async fn save(&self, model: &mut Model) -> ModelResult<()> {
        let definition = model.definition().clone();

        if model.exists() {
            if !model.is_dirty() {
                return Ok(());
            }
            model.touch_timestamps(false);
            let key = model.key();
            if key.is_null() {
                return Err(ModelError::InvalidKey(format!(
                    "cannot update a '{}' without a primary key",
                    definition.name()
                )));
            }
            let query = ModelQuery::new(self.clone(), definition.clone())
                .without_global_scopes()
                .where_eq(&definition.qualify_column(definition.primary_key()), key);
            self.executor.update(&query.to_builder(), &model.dirty()).await?;
        } else {
            model.touch_timestamps(true);
            let key = self
                .executor
                .insert_get_id(definition.table(), model.attributes(), definition.primary_key())
                .await?;
            model.set_attribute(definition.primary_key(), key);
            model.set_exists(true);
        }

        debug!(model = %definition.name(), key = %model.key(), "saved model");
        model.sync_original();
        Ok(())
    }

    /// Relation `name` of `parent`, scoped to that parent
    pub fn relation(&self, parent: &Model, name: &str) -> ModelResult<Box<dyn Relation>> {
        let mut relation = make_relation(self, parent.definition(), name)?;
        relation.add_constraints(parent);
        Ok(relation)
    }

    /// Fetch relation `name` of `parent` without storing it on the model
    pub async fn related(&self, parent: &Model, name: &str) -> ModelResult<RelationValue> {
        self.relation(parent, name)?.get_results(parent).await
    }

    /// Fetch relation `name` of `parent` and cache it in the relation slot
    pub async fn load_relation(&self, parent: &mut Model, name: &str) -> ModelResult<()> {
        let value = self.related(parent, name).await?;
        parent.set_relation(name, value);
        Ok(())
    }

    /// Eager load relations onto a single model
    pub async fn load<S: Into<EagerLoadSpec>>(&self, model: &mut Model, spec: S) -> ModelResult<()> {
        let query = self.query(model.model_name())?.with(spec);
        query.eager_load_relations(std::slice::from_mut(model)).await
    }

    pub fn has_one_or_many(&self, parent: &Model, name: &str) -> ModelResult<HasOneOrMany> {
        let mut relation = make_typed(self, parent.definition(), name, HasOneOrMany::new)?;
        relation.add_constraints(parent);
        Ok(relation)
    }

    pub fn belongs_to(&self, parent: &Model, name: &str) -> ModelResult<BelongsTo> {
        let mut relation = make_typed(self, parent.definition(), name, BelongsTo::new)?;
        relation.add_constraints(parent);
        Ok(relation)
    }

    pub fn belongs_to_many(&self, parent: &Model, name: &str) -> ModelResult<BelongsToMany> {
        let mut relation = make_typed(self, parent.definition(), name, BelongsToMany::new)?;
        relation.add_constraints(parent);
        Ok(relation)
    }

    pub fn has_many_through(&self, parent: &Model, name: &str) -> ModelResult<HasManyThrough> {
        let mut relation = make_typed(self, parent.definition(), name, HasManyThrough::new)?;
        relation.add_constraints(parent);
        Ok(relation)
    }
}
