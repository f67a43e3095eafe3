//! Capability traits
//!
//! Narrow interfaces over [`Model`] so helpers can ask only for what they use:
//! attribute access, relation slots, timestamps, soft deletes.

use crate::backends::{DatabaseValue, Row};

use super::{Model, RelationValue};

/// Read/write access to raw attributes
pub trait Attributable {
    fn get_attribute(&self, column: &str) -> Option<&DatabaseValue>;

    fn set_attribute(&mut self, column: &str, value: DatabaseValue);

    fn attributes(&self) -> &Row;
}

/// Named relation slots
pub trait Relatable {
    fn get_relation(&self, name: &str) -> Option<&RelationValue>;

    fn set_relation(&mut self, name: &str, value: RelationValue);

    fn relation_loaded(&self, name: &str) -> bool {
        self.get_relation(name).is_some()
    }
}

/// `created_at` / `updated_at` maintenance
pub trait Timestamped: Attributable {
    fn uses_timestamps(&self) -> bool;

    fn created_at_column(&self) -> &str;

    fn updated_at_column(&self) -> &str;

    /// Stamp `updated_at`, and `created_at` as well when creating
    fn touch_timestamps(&mut self, creating: bool) {
        if !self.uses_timestamps() {
            return;
        }
        let now = DatabaseValue::now();
        let updated_at = self.updated_at_column().to_string();
        if creating {
            let created_at = self.created_at_column().to_string();
            self.set_attribute(&created_at, now.clone());
        }
        self.set_attribute(&updated_at, now);
    }
}

/// `deleted_at` based soft deletion
pub trait SoftDeletable: Attributable {
    fn deleted_at_column(&self) -> Option<&str>;

    fn trashed(&self) -> bool {
        match self.deleted_at_column() {
            Some(column) => self.get_attribute(column).map_or(false, |v| !v.is_null()),
            None => false,
        }
    }
}

impl Attributable for Model {
    fn get_attribute(&self, column: &str) -> Option<&DatabaseValue> {
        Model::get_attribute(self, column)
    }

    fn set_attribute(&mut self, column: &str, value: DatabaseValue) {
        Model::set_attribute(self, column, value)
    }

    fn attributes(&self) -> &Row {
        Model::attributes(self)
    }
}

impl Relatable for Model {
    fn get_relation(&self, name: &str) -> Option<&RelationValue> {
        Model::get_relation(self, name)
    }

    fn set_relation(&mut self, name: &str, value: RelationValue) {
        Model::set_relation(self, name, value)
    }
}

impl Timestamped for Model {
    fn uses_timestamps(&self) -> bool {
        self.definition().uses_timestamps()
    }

    fn created_at_column(&self) -> &str {
        self.definition().created_at_column()
    }

    fn updated_at_column(&self) -> &str {
        self.definition().updated_at_column()
    }
}

impl SoftDeletable for Model {
    fn deleted_at_column(&self) -> Option<&str> {
        self.definition().deleted_at_column()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDefinition;
    use std::sync::Arc;

    #[test]
    fn test_touch_timestamps() {
        let definition = Arc::new(ModelDefinition::builder("Post").timestamps().build().unwrap());
        let mut post = Model::new(definition);
        post.touch_timestamps(true);
        assert!(matches!(post.attribute("created_at"), DatabaseValue::DateTime(_)));
        assert!(matches!(post.attribute("updated_at"), DatabaseValue::DateTime(_)));

        let plain = Arc::new(ModelDefinition::builder("Tag").build().unwrap());
        let mut tag = Model::new(plain);
        tag.touch_timestamps(true);
        assert!(Attributable::attributes(&tag).is_empty());
    }

    #[test]
    fn test_trashed() {
        let definition = Arc::new(ModelDefinition::builder("Post").soft_deletes().build().unwrap());
        let mut post = Model::new(definition);
        assert!(!post.trashed());
        post.set_attribute("deleted_at", DatabaseValue::now());
        assert!(post.trashed());
    }
}
