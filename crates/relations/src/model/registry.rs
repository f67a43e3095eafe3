//! Model Registry - immutable lookup of model types and their resolved relations

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::OrmConfig;
use crate::error::{ModelError, ModelResult};

use super::ModelDefinition;

/// Every registered model type, frozen once built
#[derive(Debug)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDefinition>>,
    config: OrmConfig,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn get(&self, name: &str) -> ModelResult<&Arc<ModelDefinition>> {
        self.models
            .get(name)
            .ok_or_else(|| ModelError::Configuration(format!("model '{}' is not registered", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct ModelRegistryBuilder {
    definitions: Vec<ModelDefinition>,
    config: OrmConfig,
}

impl ModelRegistryBuilder {
    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(mut self, definition: ModelDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Resolve every declared relation against the registered types
    pub fn build(self) -> ModelResult<ModelRegistry> {
        let mut by_name: HashMap<String, ModelDefinition> = HashMap::new();
        for definition in self.definitions {
            if by_name.contains_key(&definition.name) {
                return Err(ModelError::Configuration(format!(
                    "model '{}' is registered twice",
                    definition.name
                )));
            }
            by_name.insert(definition.name.clone(), definition);
        }

        let mut resolved = HashMap::with_capacity(by_name.len());
        for (name, definition) in &by_name {
            let mut relations = HashMap::with_capacity(definition.relation_specs.len());
            for spec in &definition.relation_specs {
                let related = by_name.get(&spec.related).ok_or_else(|| {
                    ModelError::Configuration(format!(
                        "relation '{}' on '{}' refers to unknown model '{}'",
                        spec.name, name, spec.related
                    ))
                })?;
                let through = match &spec.through {
                    Some(through) => Some(by_name.get(through).ok_or_else(|| {
                        ModelError::Configuration(format!(
                            "relation '{}' on '{}' goes through unknown model '{}'",
                            spec.name, name, through
                        ))
                    })?),
                    None => None,
                };
                let relation = spec.resolve(definition, related, through, &self.config.pivot_accessor)?;
                relations.insert(spec.name.clone(), relation);
            }
            resolved.insert(name.clone(), relations);
        }

        let mut models = HashMap::with_capacity(by_name.len());
        for (name, mut definition) in by_name {
            definition.relations = resolved.remove(&name).unwrap_or_default();
            debug!(model = %name, relations = definition.relations.len(), "registered model");
            models.insert(name, Arc::new(definition));
        }

        Ok(ModelRegistry {
            models,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::{JoinKeys, RelationKind, RelationSpec};

    #[test]
    fn test_conventional_keys_are_resolved() {
        let registry = ModelRegistry::builder()
            .register(
                ModelDefinition::builder("User")
                    .has_many("posts", "Post")
                    .belongs_to_many("roles", "Role")
                    .build()
                    .unwrap(),
            )
            .register(ModelDefinition::builder("Post").belongs_to("author", "User").build().unwrap())
            .register(ModelDefinition::builder("Role").build().unwrap())
            .build()
            .unwrap();

        let user = registry.get("User").unwrap();
        let posts = user.relation("posts").unwrap();
        assert_eq!(posts.kind, RelationKind::HasMany);
        match &posts.keys {
            JoinKeys::Direct { foreign_key, local_key } => {
                assert_eq!(foreign_key, "user_id");
                assert_eq!(local_key, "id");
            }
            other => panic!("unexpected keys {:?}", other),
        }

        match &user.relation("roles").unwrap().keys {
            JoinKeys::Pivot(pivot) => {
                assert_eq!(pivot.table, "role_user");
                assert_eq!(pivot.foreign_pivot_key, "user_id");
                assert_eq!(pivot.related_pivot_key, "role_id");
                assert_eq!(pivot.accessor, "pivot");
            }
            other => panic!("unexpected keys {:?}", other),
        }

        let post = registry.get("Post").unwrap();
        match &post.relation("author").unwrap().keys {
            JoinKeys::Owner { foreign_key, owner_key } => {
                assert_eq!(foreign_key, "author_id");
                assert_eq!(owner_key, "id");
            }
            other => panic!("unexpected keys {:?}", other),
        }
    }

    #[test]
    fn test_unknown_related_model_is_a_configuration_error() {
        let result = ModelRegistry::builder()
            .register(ModelDefinition::builder("User").has_many("posts", "Post").build().unwrap())
            .build();
        assert!(matches!(result, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn test_default_model_on_collection_relation_is_rejected() {
        let result = ModelRegistry::builder()
            .register(
                ModelDefinition::builder("User")
                    .relation(RelationSpec::has_many("posts", "Post").with_default(Default::default()))
                    .build()
                    .unwrap(),
            )
            .register(ModelDefinition::builder("Post").build().unwrap())
            .build();
        assert!(matches!(result, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn test_pivot_accessor_follows_config() {
        let registry = ModelRegistry::builder()
            .config(OrmConfig::default().with_pivot_accessor("membership"))
            .register(ModelDefinition::builder("User").belongs_to_many("teams", "Team").build().unwrap())
            .register(ModelDefinition::builder("Team").build().unwrap())
            .build()
            .unwrap();

        match &registry.get("User").unwrap().relation("teams").unwrap().keys {
            JoinKeys::Pivot(pivot) => assert_eq!(pivot.accessor, "membership"),
            other => panic!("unexpected keys {:?}", other),
        }
    }
}
