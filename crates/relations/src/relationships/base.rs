//! State and helpers shared by the relation kinds

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backends::DatabaseValue;
use crate::collection::Collection;
use crate::context::OrmContext;
use crate::error::ModelResult;
use crate::model::{Model, ModelDefinition};
use crate::query::ModelQuery;

use super::RelationDefinition;

pub(crate) struct RelationBase {
    pub(crate) ctx: OrmContext,
    pub(crate) definition: RelationDefinition,
    pub(crate) related: Arc<ModelDefinition>,
    pub(crate) query: ModelQuery,
}

impl RelationBase {
    pub(crate) fn new(
        ctx: &OrmContext,
        parent: &ModelDefinition,
        definition: RelationDefinition,
    ) -> ModelResult<Self> {
        let related = ctx.model(&definition.related)?;
        let mut query = ModelQuery::new(ctx.clone(), related.clone());

        // Self-referencing: the related table gets its own name
        if related.table() == parent.table() {
            let alias = format!("{}_{}", definition.name, related.table());
            query = query.aliased(&alias);
        }

        Ok(Self {
            ctx: ctx.clone(),
            definition,
            related,
            query,
        })
    }

    /// Column of the related table as the related query refers to it
    pub(crate) fn qualify(&self, column: &str) -> String {
        self.query.qualify(column)
    }

    /// Default model for an unmatched single-model relation
    pub(crate) fn default_model(&self, foreign: Option<(&str, DatabaseValue)>) -> Option<Box<Model>> {
        let attributes = self.definition.default.as_ref()?;
        let mut model = Model::new(self.related.clone());
        model.fill(attributes.clone());
        if let Some((column, value)) = foreign {
            model.set_attribute(column, value);
        }
        Some(Box::new(model))
    }
}

/// Distinct non-null values of `column` across the parents, sorted
pub(crate) fn collect_keys(models: &[Model], column: &str) -> Vec<DatabaseValue> {
    let mut seen = HashSet::new();
    let mut keys: Vec<DatabaseValue> = models
        .iter()
        .map(|model| model.attribute(column))
        .filter(|key| key.dictionary_key().map_or(false, |k| seen.insert(k)))
        .collect();

    keys.sort_by(|a, b| {
        a.compare(b)
            .unwrap_or_else(|| a.dictionary_key().cmp(&b.dictionary_key()))
    });
    keys
}

/// Results grouped by a key extracted from each model, in fetch order
pub(crate) fn group_by_key<F>(results: Collection, key: F) -> HashMap<String, Vec<Model>>
where
    F: Fn(&Model) -> DatabaseValue,
{
    let mut dictionary: HashMap<String, Vec<Model>> = HashMap::new();
    for model in results {
        if let Some(k) = key(&model).dictionary_key() {
            dictionary.entry(k).or_default().push(model);
        }
    }
    dictionary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::row_from_json;
    use serde_json::json;

    #[test]
    fn test_collect_keys_sorts_and_dedupes() {
        let definition = Arc::new(ModelDefinition::builder("Post").build().unwrap());
        let models: Vec<Model> = [3, 1, 3, 2]
            .iter()
            .map(|id| Model::from_row(definition.clone(), row_from_json(json!({"user_id": id}))))
            .chain(std::iter::once(Model::from_row(
                definition.clone(),
                row_from_json(json!({"user_id": null})),
            )))
            .collect();

        assert_eq!(
            collect_keys(&models, "user_id"),
            vec![DatabaseValue::Int64(1), DatabaseValue::Int64(2), DatabaseValue::Int64(3)]
        );
    }
}
