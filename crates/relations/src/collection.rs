//! Collection - ordered set of model instances with key-based helpers

use std::collections::{HashMap, HashSet};

use serde::{Serialize, Serializer};

use crate::backends::DatabaseValue;
use crate::context::OrmContext;
use crate::error::ModelResult;
use crate::loading::EagerLoadSpec;
use crate::model::Model;
use crate::query::ModelQuery;

/// Models in fetch order
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Model>,
}

impl Collection {
    pub fn new(items: Vec<Model>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Model> {
        self.items.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Model> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Model> {
        self.items.first()
    }

    pub fn push(&mut self, model: Model) {
        self.items.push(model);
    }

    pub fn as_slice(&self) -> &[Model] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [Model] {
        &mut self.items
    }

    pub fn into_vec(self) -> Vec<Model> {
        self.items
    }

    /// Distinct non-null primary keys, in first-seen order
    pub fn model_keys(&self) -> Vec<DatabaseValue> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .map(Model::key)
            .filter(|key| key.dictionary_key().map_or(false, |k| seen.insert(k)))
            .collect()
    }

    /// Models keyed by primary key; a later model wins over an earlier one
    pub fn dictionary(&self) -> HashMap<String, &Model> {
        self.items
            .iter()
            .filter_map(|model| model.key().dictionary_key().map(|key| (key, model)))
            .collect()
    }

    pub fn contains<K: Into<DatabaseValue>>(&self, key: K) -> bool {
        self.find(key).is_some()
    }

    pub fn find<K: Into<DatabaseValue>>(&self, key: K) -> Option<&Model> {
        let key = key.into();
        self.items.iter().find(|model| model.key().loosely_equals(&key))
    }

    pub fn find_many<K: Into<DatabaseValue>>(&self, keys: Vec<K>) -> Collection {
        let keys = key_set(keys);
        self.filter_keys(|key| keys.contains(key))
    }

    /// Models whose key is absent from `other`
    pub fn diff(&self, other: &Collection) -> Collection {
        let keys = key_set(other.model_keys());
        self.filter_keys(|key| !keys.contains(key))
    }

    /// Models whose key is also in `other`
    pub fn intersect(&self, other: &Collection) -> Collection {
        let keys = key_set(other.model_keys());
        self.filter_keys(|key| keys.contains(key))
    }

    /// First model per key; unsaved models are all kept
    pub fn unique(&self) -> Collection {
        let mut seen = HashSet::new();
        Collection::new(
            self.items
                .iter()
                .filter(|model| match model.key().dictionary_key() {
                    Some(key) => seen.insert(key),
                    None => true,
                })
                .cloned()
                .collect(),
        )
    }

    pub fn except<K: Into<DatabaseValue>>(&self, keys: Vec<K>) -> Collection {
        let keys = key_set(keys);
        self.filter_keys(|key| !keys.contains(key))
    }

    pub fn only<K: Into<DatabaseValue>>(&self, keys: Vec<K>) -> Collection {
        self.find_many(keys)
    }

    /// One attribute from every model
    pub fn pluck(&self, column: &str) -> Vec<DatabaseValue> {
        self.items.iter().map(|model| model.get(column)).collect()
    }

    /// Eager load relations onto the models already in the collection
    pub async fn load<S: Into<EagerLoadSpec>>(&mut self, ctx: &OrmContext, spec: S) -> ModelResult<()> {
        let model = match self.items.first() {
            Some(model) => model.model_name().to_string(),
            None => return Ok(()),
        };
        let query = ctx.query(&model)?.with(spec);
        query.eager_load_relations(&mut self.items).await
    }

    /// Reload every model from storage, keeping collection order and
    /// dropping models that no longer exist
    pub async fn fresh<S: Into<EagerLoadSpec>>(&self, ctx: &OrmContext, spec: S) -> ModelResult<Collection> {
        let query = match self.to_query(ctx)? {
            Some(query) => query.with(spec),
            None => return Ok(Collection::default()),
        };
        let fetched = query.get().await?;
        let by_key = fetched.dictionary();

        Ok(Collection::new(
            self.items
                .iter()
                .filter_map(|model| model.key().dictionary_key())
                .filter_map(|key| by_key.get(&key).map(|model| (*model).clone()))
                .collect(),
        ))
    }

    /// Query constrained to the keys of this collection
    pub fn to_query(&self, ctx: &OrmContext) -> ModelResult<Option<ModelQuery>> {
        let model = match self.items.first() {
            Some(model) => model,
            None => return Ok(None),
        };
        let query = ctx.query(model.model_name())?;
        let column = query.qualify(model.key_name());
        Ok(Some(query.where_in(&column, self.model_keys())))
    }

    fn filter_keys<F: Fn(&String) -> bool>(&self, keep: F) -> Collection {
        Collection::new(
            self.items
                .iter()
                .filter(|model| model.key().dictionary_key().map_or(false, |key| keep(&key)))
                .cloned()
                .collect(),
        )
    }
}

fn key_set<K: Into<DatabaseValue>>(keys: Vec<K>) -> HashSet<String> {
    keys.into_iter()
        .filter_map(|key| key.into().dictionary_key())
        .collect()
}

impl IntoIterator for Collection {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Model> for Collection {
    fn from_iter<I: IntoIterator<Item = Model>>(iter: I) -> Self {
        Collection::new(iter.into_iter().collect())
    }
}

impl From<Vec<Model>> for Collection {
    fn from(items: Vec<Model>) -> Self {
        Collection::new(items)
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}
