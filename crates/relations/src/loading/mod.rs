//! Eager loading: relation path specifications, the batch loader and relation aggregates

pub mod aggregates;
pub mod eager_loader;
pub mod spec;

#[cfg(test)]
mod eager_loading_tests;

pub use aggregates::AggregateFunction;
pub(crate) use aggregates::AggregateLoad;
pub use spec::{Constraint, EagerLoadSpec};
