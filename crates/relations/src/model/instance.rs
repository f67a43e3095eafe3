//! Model instances: attributes, loaded relations and serialization

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::backends::{DatabaseValue, KeyType, Row};
use crate::collection::Collection;
use crate::error::ModelResult;
use crate::relationships::Pivot;

use super::ModelDefinition;

/// Value stored in a model's relation slot
#[derive(Debug, Clone)]
pub enum RelationValue {
    One(Option<Box<Model>>),
    Many(Collection),
    Pivot(Pivot),
}

impl RelationValue {
    pub fn as_one(&self) -> Option<&Model> {
        match self {
            RelationValue::One(model) => model.as_deref(),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection> {
        match self {
            RelationValue::Many(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_pivot(&self) -> Option<&Pivot> {
        match self {
            RelationValue::Pivot(pivot) => Some(pivot),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            RelationValue::One(None) => JsonValue::Null,
            RelationValue::One(Some(model)) => model.to_json(),
            RelationValue::Many(collection) => {
                JsonValue::Array(collection.iter().map(Model::to_json).collect())
            }
            RelationValue::Pivot(pivot) => pivot.to_json(),
        }
    }
}

/// A row of a registered model type
#[derive(Clone)]
pub struct Model {
    definition: Arc<ModelDefinition>,
    attributes: Row,
    original: Row,
    relations: BTreeMap<String, RelationValue>,
    exists: bool,
}

impl Model {
    /// A fresh, unsaved instance
    pub fn new(definition: Arc<ModelDefinition>) -> Self {
        Self {
            definition,
            attributes: Row::new(),
            original: Row::new(),
            relations: BTreeMap::new(),
            exists: false,
        }
    }

    /// Instance hydrated from a fetched row
    pub fn from_row(definition: Arc<ModelDefinition>, row: Row) -> Self {
        Self {
            definition,
            original: row.clone(),
            attributes: row,
            relations: BTreeMap::new(),
            exists: true,
        }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn model_name(&self) -> &str {
        self.definition.name()
    }

    /// Primary key value, `Null` when unset
    pub fn key(&self) -> DatabaseValue {
        self.attribute(self.definition.primary_key())
    }

    pub fn key_name(&self) -> &str {
        self.definition.primary_key()
    }

    pub fn key_type(&self) -> KeyType {
        self.definition.key_type()
    }

    pub fn table(&self) -> &str {
        self.definition.table()
    }

    pub fn qualify_column(&self, column: &str) -> String {
        self.definition.qualify_column(column)
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub fn get_attribute(&self, column: &str) -> Option<&DatabaseValue> {
        self.attributes.get(column)
    }

    /// Raw attribute, `Null` when absent
    pub fn attribute(&self, column: &str) -> DatabaseValue {
        self.attributes.get(column).cloned().unwrap_or(DatabaseValue::Null)
    }

    pub fn set_attribute<T: Into<DatabaseValue>>(&mut self, column: &str, value: T) {
        self.attributes.insert(column.to_string(), value.into());
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Assign several attributes through their mutators
    pub fn fill(&mut self, attributes: Row) {
        for (column, value) in attributes {
            self.set(&column, value);
        }
    }

    /// Read an attribute through its accessor when one is registered
    pub fn get(&self, name: &str) -> DatabaseValue {
        match self.definition.getter(name) {
            Some(getter) => getter(self),
            None => self.attribute(name),
        }
    }

    /// Assign an attribute through its mutator when one is registered
    pub fn set<T: Into<DatabaseValue>>(&mut self, name: &str, value: T) {
        let value = value.into();
        match self.definition.setter(name).cloned() {
            Some(setter) => setter(&mut self.attributes, value),
            None => {
                self.attributes.insert(name.to_string(), value);
            }
        }
    }

    /// Attributes changed since the model was fetched or last saved
    pub fn dirty(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(column, value)| match self.original.get(*column) {
                Some(original) => original != *value,
                None => true,
            })
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    pub(crate) fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Set a value computed at fetch time; it does not count as a change
    pub(crate) fn set_loaded_attribute(&mut self, column: &str, value: DatabaseValue) {
        self.attributes.insert(column.to_string(), value.clone());
        self.original.insert(column.to_string(), value);
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: &str, value: RelationValue) {
        self.relations.insert(name.to_string(), value);
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.relations.remove(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, RelationValue> {
        &self.relations
    }

    /// Loaded single-model relation
    pub fn related_one(&self, name: &str) -> Option<&Model> {
        self.relations.get(name).and_then(RelationValue::as_one)
    }

    /// Loaded collection relation
    pub fn related_many(&self, name: &str) -> Option<&Collection> {
        self.relations.get(name).and_then(RelationValue::as_many)
    }

    /// Pivot record under the default accessor
    pub fn pivot(&self) -> Option<&Pivot> {
        self.pivot_as("pivot")
    }

    pub fn pivot_as(&self, accessor: &str) -> Option<&Pivot> {
        self.relations.get(accessor).and_then(RelationValue::as_pivot)
    }

    /// Instance of the same type
    pub fn new_instance(&self, attributes: Row, exists: bool) -> Model {
        let mut model = Model::new(self.definition.clone());
        model.attributes = attributes;
        if exists {
            model.sync_original();
        }
        model.exists = exists;
        model
    }

    pub fn new_collection(&self, items: Vec<Model>) -> Collection {
        Collection::new(items)
    }

    /// Visible attributes plus loaded relations as a JSON object
    pub fn to_json(&self) -> JsonValue {
        let mut object = serde_json::Map::new();
        for (column, value) in &self.attributes {
            if !self.definition.is_hidden(column) {
                object.insert(column.clone(), value.to_json());
            }
        }
        for (name, relation) in &self.relations {
            object.insert(name.clone(), relation.to_json());
        }
        JsonValue::Object(object)
    }

    /// Deserialize into a typed struct
    pub fn cast<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("model", &self.definition.name())
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("exists", &self.exists)
            .finish()
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
