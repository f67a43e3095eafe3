//! Model Definition - per-type metadata: table, keys, scopes, relations, accessors

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backends::{DatabaseValue, KeyType, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::{ModelQuery, QueryBuilder};
use crate::relationships::{RelationDefinition, RelationSpec};
use crate::scope::{LocalScope, Scope, ScopeFn, SoftDeletingScope, SOFT_DELETING_SCOPE};

use super::naming;
use super::Model;

/// Computed attribute read through [`Model::get`]
pub type Getter = Arc<dyn Fn(&Model) -> DatabaseValue + Send + Sync>;

/// Attribute transformation applied by [`Model::set`]
pub type Setter = Arc<dyn Fn(&mut Row, DatabaseValue) + Send + Sync>;

/// Metadata shared by every instance of a model type
#[derive(Clone)]
pub struct ModelDefinition {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) key_type: KeyType,
    pub(crate) timestamps: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) soft_deletes: bool,
    pub(crate) deleted_at: String,
    pub(crate) per_page: Option<i64>,
    pub(crate) global_scopes: Vec<(String, Arc<dyn Scope>)>,
    pub(crate) local_scopes: HashMap<String, LocalScope>,
    pub(crate) relation_specs: Vec<RelationSpec>,
    pub(crate) relations: HashMap<String, RelationDefinition>,
    pub(crate) getters: HashMap<String, Getter>,
    pub(crate) setters: HashMap<String, Setter>,
    pub(crate) hidden: Vec<String>,
}

impl ModelDefinition {
    /// Start defining a model type; table and foreign keys derive from `name`
    pub fn builder(name: &str) -> ModelDefinitionBuilder {
        ModelDefinitionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn created_at_column(&self) -> &str {
        &self.created_at
    }

    pub fn updated_at_column(&self) -> &str {
        &self.updated_at
    }

    pub fn uses_soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    /// `deleted_at` column when the type soft-deletes
    pub fn deleted_at_column(&self) -> Option<&str> {
        if self.soft_deletes {
            Some(&self.deleted_at)
        } else {
            None
        }
    }

    pub fn per_page(&self) -> Option<i64> {
        self.per_page
    }

    pub fn qualify_column(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }

    pub fn relation(&self, name: &str) -> ModelResult<&RelationDefinition> {
        self.relations.get(name).ok_or_else(|| ModelError::RelationNotFound {
            model: self.name.clone(),
            relation: name.to_string(),
        })
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn relation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.relations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn local_scope(&self, name: &str) -> ModelResult<&LocalScope> {
        self.local_scopes.get(name).ok_or_else(|| ModelError::ScopeNotFound {
            model: self.name.clone(),
            scope: name.to_string(),
        })
    }

    /// Global scopes in registration order
    pub fn global_scopes(&self) -> impl Iterator<Item = (&str, &Arc<dyn Scope>)> {
        self.global_scopes.iter().map(|(name, scope)| (name.as_str(), scope))
    }

    pub fn has_global_scope(&self, name: &str) -> bool {
        self.global_scopes.iter().any(|(n, _)| n == name)
    }

    pub fn getter(&self, attribute: &str) -> Option<&Getter> {
        self.getters.get(attribute)
    }

    pub fn setter(&self, attribute: &str) -> Option<&Setter> {
        self.setters.get(attribute)
    }

    pub fn is_hidden(&self, attribute: &str) -> bool {
        self.hidden.iter().any(|h| h == attribute)
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<&str> = self.global_scopes.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("key_type", &self.key_type)
            .field("timestamps", &self.timestamps)
            .field("soft_deletes", &self.soft_deletes)
            .field("global_scopes", &scopes)
            .field("relations", &self.relation_names())
            .finish()
    }
}

/// Fluent builder for [`ModelDefinition`]
pub struct ModelDefinitionBuilder {
    definition: ModelDefinition,
    errors: Vec<String>,
}

impl ModelDefinitionBuilder {
    fn new(name: &str) -> Self {
        Self {
            definition: ModelDefinition {
                name: name.to_string(),
                table: naming::table_name(name),
                primary_key: "id".to_string(),
                key_type: KeyType::Int,
                timestamps: false,
                created_at: "created_at".to_string(),
                updated_at: "updated_at".to_string(),
                soft_deletes: false,
                deleted_at: "deleted_at".to_string(),
                per_page: None,
                global_scopes: Vec::new(),
                local_scopes: HashMap::new(),
                relation_specs: Vec::new(),
                relations: HashMap::new(),
                getters: HashMap::new(),
                setters: HashMap::new(),
                hidden: Vec::new(),
            },
            errors: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.definition.table = table.to_string();
        self
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.definition.primary_key = column.to_string();
        self
    }

    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.definition.key_type = key_type;
        self
    }

    /// Maintain `created_at`/`updated_at` on insert and update
    pub fn timestamps(mut self) -> Self {
        self.definition.timestamps = true;
        self
    }

    pub fn timestamp_columns(mut self, created_at: &str, updated_at: &str) -> Self {
        self.definition.timestamps = true;
        self.definition.created_at = created_at.to_string();
        self.definition.updated_at = updated_at.to_string();
        self
    }

    /// Soft-delete through `deleted_at`, hiding trashed rows by default
    pub fn soft_deletes(mut self) -> Self {
        if !self.definition.soft_deletes {
            self.definition.soft_deletes = true;
            self = self.global_scope(SOFT_DELETING_SCOPE, SoftDeletingScope);
        }
        self
    }

    pub fn deleted_at_column(mut self, column: &str) -> Self {
        self.definition.deleted_at = column.to_string();
        self.soft_deletes()
    }

    pub fn per_page(mut self, per_page: i64) -> Self {
        self.definition.per_page = Some(per_page);
        self
    }

    pub fn global_scope<S: Scope + 'static>(mut self, name: &str, scope: S) -> Self {
        if self.check_name("global scope", name, self.definition.has_global_scope(name)) {
            self.definition.global_scopes.push((name.to_string(), Arc::new(scope)));
        }
        self
    }

    pub fn global_scope_fn<F>(self, name: &str, scope: F) -> Self
    where
        F: Fn(QueryBuilder, &ModelDefinition) -> QueryBuilder + Send + Sync + 'static,
    {
        self.global_scope(name, ScopeFn(scope))
    }

    /// Named scope invoked with caller arguments via [`ModelQuery::scope`]
    pub fn local_scope<F>(mut self, name: &str, scope: F) -> Self
    where
        F: Fn(ModelQuery, &[DatabaseValue]) -> ModelResult<ModelQuery> + Send + Sync + 'static,
    {
        let exists = self.definition.local_scopes.contains_key(name);
        if self.check_name("local scope", name, exists) {
            self.definition.local_scopes.insert(name.to_string(), Arc::new(scope));
        }
        self
    }

    pub fn relation(mut self, spec: RelationSpec) -> Self {
        let exists = self.definition.relation_specs.iter().any(|r| r.name == spec.name);
        if self.check_name("relation", &spec.name, exists) {
            self.definition.relation_specs.push(spec);
        }
        self
    }

    pub fn has_one(self, name: &str, related: &str) -> Self {
        self.relation(RelationSpec::has_one(name, related))
    }

    pub fn has_many(self, name: &str, related: &str) -> Self {
        self.relation(RelationSpec::has_many(name, related))
    }

    pub fn belongs_to(self, name: &str, related: &str) -> Self {
        self.relation(RelationSpec::belongs_to(name, related))
    }

    pub fn belongs_to_many(self, name: &str, related: &str) -> Self {
        self.relation(RelationSpec::belongs_to_many(name, related))
    }

    pub fn has_many_through(self, name: &str, related: &str, through: &str) -> Self {
        self.relation(RelationSpec::has_many_through(name, related, through))
    }

    pub fn has_one_through(self, name: &str, related: &str, through: &str) -> Self {
        self.relation(RelationSpec::has_one_through(name, related, through))
    }

    /// Computed attribute
    pub fn accessor<F>(mut self, attribute: &str, getter: F) -> Self
    where
        F: Fn(&Model) -> DatabaseValue + Send + Sync + 'static,
    {
        let exists = self.definition.getters.contains_key(attribute);
        if self.check_name("accessor", attribute, exists) {
            self.definition.getters.insert(attribute.to_string(), Arc::new(getter));
        }
        self
    }

    /// Transformation run when the attribute is assigned
    pub fn mutator<F>(mut self, attribute: &str, setter: F) -> Self
    where
        F: Fn(&mut Row, DatabaseValue) + Send + Sync + 'static,
    {
        let exists = self.definition.setters.contains_key(attribute);
        if self.check_name("mutator", attribute, exists) {
            self.definition.setters.insert(attribute.to_string(), Arc::new(setter));
        }
        self
    }

    /// Columns left out of serialized output
    pub fn hidden(mut self, columns: &[&str]) -> Self {
        self.definition.hidden.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn build(self) -> ModelResult<ModelDefinition> {
        if !self.errors.is_empty() {
            return Err(ModelError::InvalidArgument(format!(
                "model '{}': {}",
                self.definition.name,
                self.errors.join("; ")
            )));
        }
        if self.definition.name.trim().is_empty() {
            return Err(ModelError::InvalidArgument("model name cannot be empty".to_string()));
        }
        Ok(self.definition)
    }

    fn check_name(&mut self, what: &str, name: &str, exists: bool) -> bool {
        if name.trim().is_empty() {
            self.errors.push(format!("{} name cannot be empty", what));
            false
        } else if exists {
            self.errors.push(format!("duplicate {} '{}'", what, name));
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_defaults() {
        let definition = ModelDefinition::builder("BlogPost").build().unwrap();
        assert_eq!(definition.table(), "blog_posts");
        assert_eq!(definition.primary_key(), "id");
        assert_eq!(definition.key_type(), KeyType::Int);
        assert!(definition.deleted_at_column().is_none());
        assert_eq!(definition.qualify_column("id"), "blog_posts.id");
    }

    #[test]
    fn test_soft_deletes_registers_scope_once() {
        let definition = ModelDefinition::builder("Post")
            .soft_deletes()
            .soft_deletes()
            .build()
            .unwrap();
        assert!(definition.has_global_scope(SOFT_DELETING_SCOPE));
        assert_eq!(definition.global_scopes().count(), 1);
        assert_eq!(definition.deleted_at_column(), Some("deleted_at"));
    }

    #[test]
    fn test_duplicate_and_empty_scope_names_are_rejected() {
        let duplicate = ModelDefinition::builder("Post")
            .local_scope("published", |q, _| Ok(q))
            .local_scope("published", |q, _| Ok(q))
            .build();
        assert!(matches!(duplicate, Err(ModelError::InvalidArgument(_))));

        let empty = ModelDefinition::builder("Post")
            .global_scope_fn(" ", |q, _| q)
            .build();
        assert!(matches!(empty, Err(ModelError::InvalidArgument(_))));
    }

    #[test]
    fn test_unknown_scope_and_relation_lookups() {
        let definition = ModelDefinition::builder("User").has_many("posts", "Post").build().unwrap();
        assert!(matches!(
            definition.local_scope("active"),
            Err(ModelError::ScopeNotFound { .. })
        ));
        // Relations resolve only once registered
        assert!(matches!(
            definition.relation("posts"),
            Err(ModelError::RelationNotFound { .. })
        ));
    }
}
