//! Eager Loader - loads relation paths for a batch of parents with one query per path

use futures::future::try_join_all;
use tracing::debug;

use crate::collection::Collection;
use crate::error::ModelResult;
use crate::model::Model;
use crate::query::ModelQuery;
use crate::relationships::{make_relation, Relation};

/// Load every top-level path of `query`'s eager-load spec onto `models`.
///
/// Relations are resolved before anything is fetched, so an unknown name
/// fails without touching the database. Nested paths ride along on each
/// relation query and are loaded when that query runs.
pub(crate) async fn eager_load_relations(query: &ModelQuery, models: &mut [Model]) -> ModelResult<()> {
    let spec = query.eager_load();
    if spec.is_empty() {
        return Ok(());
    }

    let mut relations: Vec<Box<dyn Relation>> = Vec::new();
    for (name, constraint) in spec.top_level() {
        let mut relation = make_relation(query.context(), query.model(), &name)?;
        if let Some(constraint) = constraint {
            relation.constrain(&*constraint);
        }
        relation.with_nested(spec.nested_under(&name));
        relations.push(relation);
    }

    if models.is_empty() {
        return Ok(());
    }

    for relation in relations.iter_mut() {
        relation.add_eager_constraints(models);
    }

    debug!(
        model = %query.model().name(),
        parents = models.len(),
        relations = relations.len(),
        "eager loading relations"
    );

    let results: Vec<Collection> = if query.context().config().concurrent_eager_loading {
        try_join_all(relations.iter().map(|relation| relation.get())).await?
    } else {
        let mut results = Vec::with_capacity(relations.len());
        for relation in &relations {
            results.push(relation.get().await?);
        }
        results
    };

    for (relation, results) in relations.iter().zip(results) {
        debug!(relation = %relation.name(), results = results.len(), "matching eager results");
        relation.init_relation(models);
        relation.match_results(models, results);
    }
    Ok(())
}
