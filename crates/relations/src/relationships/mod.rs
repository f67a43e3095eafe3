//! Relationships - definitions, the Relation contract and every relation kind

pub(crate) mod base;
pub mod belongs_to;
pub mod belongs_to_many;
pub mod definition;
pub mod has_many_through;
pub mod has_one_or_many;
pub mod pivot;
pub mod sync;
pub mod traits;

#[cfg(test)]
mod lazy_loading_tests;

use std::sync::Arc;

pub use belongs_to::BelongsTo;
pub use belongs_to_many::BelongsToMany;
pub use definition::{JoinKeys, PivotDefinition, RelationDefinition, RelationKind, RelationSpec, ThroughDefinition};
pub use has_many_through::{HasManyThrough, THROUGH_KEY};
pub use has_one_or_many::HasOneOrMany;
pub use pivot::Pivot;
pub use sync::{SyncChanges, SyncIds};
pub use traits::Relation;

use crate::context::OrmContext;
use crate::error::ModelResult;
use crate::model::ModelDefinition;

use base::RelationBase;

/// Build the unscoped relation `name` of a parent model type
pub(crate) fn make_relation(
    ctx: &OrmContext,
    parent: &Arc<ModelDefinition>,
    name: &str,
) -> ModelResult<Box<dyn Relation>> {
    let definition = parent.relation(name)?.clone();
    let kind = definition.kind;
    let base = RelationBase::new(ctx, parent, definition)?;

    Ok(match kind {
        RelationKind::HasOne | RelationKind::HasMany => Box::new(HasOneOrMany::new(base)?),
        RelationKind::BelongsTo => Box::new(BelongsTo::new(base)?),
        RelationKind::BelongsToMany => Box::new(BelongsToMany::new(base)?),
        RelationKind::HasManyThrough | RelationKind::HasOneThrough => Box::new(HasManyThrough::new(base)?),
    })
}

/// Build a relation as its concrete kind
pub(crate) fn make_typed<R, F>(
    ctx: &OrmContext,
    parent: &Arc<ModelDefinition>,
    name: &str,
    build: F,
) -> ModelResult<R>
where
    F: FnOnce(RelationBase) -> ModelResult<R>,
{
    let definition = parent.relation(name)?.clone();
    build(RelationBase::new(ctx, parent, definition)?)
}
