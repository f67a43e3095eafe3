//! Relation contract shared by every relationship kind

use async_trait::async_trait;

use crate::collection::Collection;
use crate::error::ModelResult;
use crate::loading::EagerLoadSpec;
use crate::model::{Model, RelationValue};
use crate::query::ModelQuery;

use super::RelationDefinition;

/// A relation between a parent model type and a related one.
///
/// Eager loading drives a relation in four steps: `add_eager_constraints`
/// with every parent, `get` once, then `init_relation` and `match_results`.
/// Lazy access calls `add_constraints` with a single parent and then
/// `get_results`.
#[async_trait]
pub trait Relation: Send + Sync {
    fn definition(&self) -> &RelationDefinition;

    fn query(&self) -> &ModelQuery;

    fn query_mut(&mut self) -> &mut ModelQuery;

    /// The related query's column holding the parent key, and the parent
    /// attribute it is compared with
    fn match_columns(&self) -> (String, String);

    fn name(&self) -> &str {
        &self.definition().name
    }

    /// Replace the related query with `constraint(query)`
    fn constrain(&mut self, constraint: &(dyn Fn(ModelQuery) -> ModelQuery + Send + Sync)) {
        let query = self.query().clone();
        *self.query_mut() = constraint(query);
    }

    /// Eager load `spec` onto the related models as they are fetched
    fn with_nested(&mut self, spec: EagerLoadSpec) {
        if spec.is_empty() {
            return;
        }
        let query = self.query().clone();
        *self.query_mut() = query.with(spec);
    }

    /// Scope the related query to one parent
    fn add_constraints(&mut self, parent: &Model);

    /// Scope the related query to every given parent with a single `IN`
    fn add_eager_constraints(&mut self, models: &[Model]);

    /// Give every parent an empty slot for this relation
    fn init_relation(&self, models: &mut [Model]);

    /// Distribute fetched results onto their parents
    fn match_results(&self, models: &mut [Model], results: Collection);

    /// Execute the related query
    async fn get(&self) -> ModelResult<Collection>;

    /// Fetch the relation for a single parent, shaped by cardinality
    async fn get_results(&self, parent: &Model) -> ModelResult<RelationValue>;
}
