//! Pivot records hydrated onto many-to-many results

use serde::{Serialize, Serializer};

use crate::backends::{DatabaseValue, Row};

/// A join-table row attached to a related model under the pivot accessor
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    table: String,
    attributes: Row,
}

impl Pivot {
    pub fn new(table: &str, attributes: Row) -> Self {
        Self {
            table: table.to_string(),
            attributes,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.attributes.get(column)
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn into_attributes(self) -> Row {
        self.attributes
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl Serialize for Pivot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
