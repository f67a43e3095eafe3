//! Relation definitions
//!
//! [`RelationSpec`] is what a model declares; keys it leaves out are filled
//! in by naming convention when the [`ModelRegistry`](crate::ModelRegistry)
//! is built, producing an immutable [`RelationDefinition`].

use serde::{Deserialize, Serialize};

use crate::backends::{DatabaseValue, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::{naming, ModelDefinition};
use crate::query::{OrderDirection, QueryOperator, WhereCondition};

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// One-to-one relationship (hasOne)
    HasOne,
    /// One-to-many relationship (hasMany)
    HasMany,
    /// Many-to-one relationship (belongsTo)
    BelongsTo,
    /// Many-to-many relationship through a pivot table
    BelongsToMany,
    /// One-to-many across an intermediate model
    HasManyThrough,
    /// One-to-one across an intermediate model
    HasOneThrough,
}

impl RelationKind {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany | Self::HasManyThrough)
    }

    /// Returns true if this relationship requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::BelongsToMany)
    }

    /// Returns true if this relationship joins an intermediate model
    pub fn is_through(self) -> bool {
        matches!(self, Self::HasManyThrough | Self::HasOneThrough)
    }
}

/// Declaration of a relation on a model type
#[derive(Debug, Clone)]
pub struct RelationSpec {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) related: String,
    pub(crate) through: Option<String>,
    pub(crate) foreign_key: Option<String>,
    pub(crate) local_key: Option<String>,
    pub(crate) owner_key: Option<String>,
    pub(crate) table: Option<String>,
    pub(crate) foreign_pivot_key: Option<String>,
    pub(crate) related_pivot_key: Option<String>,
    pub(crate) parent_key: Option<String>,
    pub(crate) related_key: Option<String>,
    pub(crate) first_key: Option<String>,
    pub(crate) second_key: Option<String>,
    pub(crate) second_local_key: Option<String>,
    pub(crate) pivot_columns: Vec<String>,
    pub(crate) pivot_timestamps: bool,
    pub(crate) accessor: Option<String>,
    pub(crate) pivot_wheres: Vec<WhereCondition>,
    pub(crate) pivot_order: Vec<(String, OrderDirection)>,
    pub(crate) default: Option<Row>,
}

impl RelationSpec {
    fn new(name: &str, kind: RelationKind, related: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            related: related.to_string(),
            through: None,
            foreign_key: None,
            local_key: None,
            owner_key: None,
            table: None,
            foreign_pivot_key: None,
            related_pivot_key: None,
            parent_key: None,
            related_key: None,
            first_key: None,
            second_key: None,
            second_local_key: None,
            pivot_columns: Vec::new(),
            pivot_timestamps: false,
            accessor: None,
            pivot_wheres: Vec::new(),
            pivot_order: Vec::new(),
            default: None,
        }
    }

    pub fn has_one(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::HasOne, related)
    }

    pub fn has_many(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::HasMany, related)
    }

    /// The relation name is required; it names both the relation slot and the
    /// default foreign key (`<name>_<owner key>`).
    pub fn belongs_to(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::BelongsTo, related)
    }

    pub fn belongs_to_many(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::BelongsToMany, related)
    }

    pub fn has_many_through(name: &str, related: &str, through: &str) -> Self {
        let mut spec = Self::new(name, RelationKind::HasManyThrough, related);
        spec.through = Some(through.to_string());
        spec
    }

    pub fn has_one_through(name: &str, related: &str, through: &str) -> Self {
        let mut spec = Self::new(name, RelationKind::HasOneThrough, related);
        spec.through = Some(through.to_string());
        spec
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Foreign key column: on the related table for has-one/many, on the
    /// declaring table for belongs-to
    pub fn foreign_key(mut self, column: &str) -> Self {
        self.foreign_key = Some(column.to_string());
        self
    }

    /// Key on the declaring model matched against the foreign key
    pub fn local_key(mut self, column: &str) -> Self {
        self.local_key = Some(column.to_string());
        self
    }

    /// Key on the owning (related) model of a belongs-to relation
    pub fn owner_key(mut self, column: &str) -> Self {
        self.owner_key = Some(column.to_string());
        self
    }

    /// Pivot table of a many-to-many relation
    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn foreign_pivot_key(mut self, column: &str) -> Self {
        self.foreign_pivot_key = Some(column.to_string());
        self
    }

    pub fn related_pivot_key(mut self, column: &str) -> Self {
        self.related_pivot_key = Some(column.to_string());
        self
    }

    pub fn parent_key(mut self, column: &str) -> Self {
        self.parent_key = Some(column.to_string());
        self
    }

    pub fn related_key(mut self, column: &str) -> Self {
        self.related_key = Some(column.to_string());
        self
    }

    /// Column on the intermediate table pointing at the declaring model
    pub fn first_key(mut self, column: &str) -> Self {
        self.first_key = Some(column.to_string());
        self
    }

    /// Column on the related table pointing at the intermediate model
    pub fn second_key(mut self, column: &str) -> Self {
        self.second_key = Some(column.to_string());
        self
    }

    /// Key on the intermediate model matched against `second_key`
    pub fn second_local_key(mut self, column: &str) -> Self {
        self.second_local_key = Some(column.to_string());
        self
    }

    /// Extra pivot columns to select and hydrate
    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if !self.pivot_columns.iter().any(|c| c == column) {
                self.pivot_columns.push(column.to_string());
            }
        }
        self
    }

    /// Maintain `created_at`/`updated_at` on the pivot table
    pub fn with_timestamps(mut self) -> Self {
        self.pivot_timestamps = true;
        self.with_pivot(&["created_at", "updated_at"])
    }

    /// Name of the relation slot the pivot record is stored under
    pub fn as_accessor(mut self, accessor: &str) -> Self {
        self.accessor = Some(accessor.to_string());
        self
    }

    pub fn where_pivot<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_pivot_where(column, QueryOperator::Equal, Some(value.into()), Vec::new())
    }

    pub fn where_pivot_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push_pivot_where(column, QueryOperator::In, None, values)
    }

    pub fn where_pivot_not_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push_pivot_where(column, QueryOperator::NotIn, None, values)
    }

    pub fn where_pivot_null(self, column: &str) -> Self {
        self.push_pivot_where(column, QueryOperator::IsNull, None, Vec::new())
    }

    pub fn where_pivot_not_null(self, column: &str) -> Self {
        self.push_pivot_where(column, QueryOperator::IsNotNull, None, Vec::new())
    }

    pub fn order_by_pivot(mut self, column: &str, direction: OrderDirection) -> Self {
        self.pivot_order.push((column.to_string(), direction));
        self
    }

    /// Attributes of the model returned when a single-model relation has no match
    pub fn with_default(mut self, attributes: Row) -> Self {
        self.default = Some(attributes);
        self
    }

    fn push_pivot_where(
        mut self,
        column: &str,
        operator: QueryOperator,
        value: Option<DatabaseValue>,
        values: Vec<DatabaseValue>,
    ) -> Self {
        self.pivot_wheres.push(WhereCondition {
            column: column.to_string(),
            operator,
            value,
            values,
        });
        self
    }

    /// Fill conventional defaults and freeze the relation
    pub(crate) fn resolve(
        &self,
        parent: &ModelDefinition,
        related: &ModelDefinition,
        through: Option<&ModelDefinition>,
        default_accessor: &str,
    ) -> ModelResult<RelationDefinition> {
        if self.default.is_some() && self.kind.is_collection() {
            return Err(ModelError::Configuration(format!(
                "relation '{}' on '{}': default models are only supported on single-model relations",
                self.name,
                parent.name()
            )));
        }

        let or = |value: &Option<String>, fallback: String| value.clone().unwrap_or(fallback);

        let keys = match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => JoinKeys::Direct {
                foreign_key: or(&self.foreign_key, naming::foreign_key(parent.name(), parent.primary_key())),
                local_key: or(&self.local_key, parent.primary_key().to_string()),
            },
            RelationKind::BelongsTo => JoinKeys::Owner {
                foreign_key: or(&self.foreign_key, naming::foreign_key(&self.name, related.primary_key())),
                owner_key: or(&self.owner_key, related.primary_key().to_string()),
            },
            RelationKind::BelongsToMany => {
                let table = or(&self.table, naming::pivot_table(parent.name(), related.name()));
                let qualify = |column: &str| {
                    if column.contains('.') {
                        column.to_string()
                    } else {
                        format!("{}.{}", table, column)
                    }
                };
                let wheres = self
                    .pivot_wheres
                    .iter()
                    .map(|condition| WhereCondition {
                        column: qualify(&condition.column),
                        ..condition.clone()
                    })
                    .collect();
                let order = self
                    .pivot_order
                    .iter()
                    .map(|(column, direction)| (qualify(column), direction.clone()))
                    .collect();

                JoinKeys::Pivot(PivotDefinition {
                    foreign_pivot_key: or(&self.foreign_pivot_key, naming::foreign_key(parent.name(), parent.primary_key())),
                    related_pivot_key: or(&self.related_pivot_key, naming::foreign_key(related.name(), related.primary_key())),
                    parent_key: or(&self.parent_key, parent.primary_key().to_string()),
                    related_key: or(&self.related_key, related.primary_key().to_string()),
                    columns: self.pivot_columns.clone(),
                    timestamps: self.pivot_timestamps,
                    accessor: or(&self.accessor, default_accessor.to_string()),
                    wheres,
                    order,
                    table,
                })
            }
            RelationKind::HasManyThrough | RelationKind::HasOneThrough => {
                let through = through.ok_or_else(|| {
                    ModelError::Configuration(format!(
                        "relation '{}' on '{}' requires an intermediate model",
                        self.name,
                        parent.name()
                    ))
                })?;
                JoinKeys::Through(ThroughDefinition {
                    through: through.name().to_string(),
                    first_key: or(&self.first_key, naming::foreign_key(parent.name(), parent.primary_key())),
                    second_key: or(&self.second_key, naming::foreign_key(through.name(), through.primary_key())),
                    local_key: or(&self.local_key, parent.primary_key().to_string()),
                    second_local_key: or(&self.second_local_key, through.primary_key().to_string()),
                })
            }
        };

        Ok(RelationDefinition {
            name: self.name.clone(),
            kind: self.kind,
            related: related.name().to_string(),
            keys,
            default: self.default.clone(),
        })
    }
}

/// A resolved, immutable relation on a model type
#[derive(Debug, Clone)]
pub struct RelationDefinition {
    pub name: String,
    pub kind: RelationKind,
    /// Related model name in the registry
    pub related: String,
    pub keys: JoinKeys,
    pub default: Option<Row>,
}

/// Join columns of a relation, by shape
#[derive(Debug, Clone)]
pub enum JoinKeys {
    /// has-one / has-many: `related.foreign_key = parent.local_key`
    Direct { foreign_key: String, local_key: String },
    /// belongs-to: `parent.foreign_key = related.owner_key`
    Owner { foreign_key: String, owner_key: String },
    Pivot(PivotDefinition),
    Through(ThroughDefinition),
}

/// Pivot table layout of a many-to-many relation
#[derive(Debug, Clone)]
pub struct PivotDefinition {
    pub table: String,
    pub foreign_pivot_key: String,
    pub related_pivot_key: String,
    pub parent_key: String,
    pub related_key: String,
    pub columns: Vec<String>,
    pub timestamps: bool,
    pub accessor: String,
    /// Conditions on the pivot table, columns qualified
    pub wheres: Vec<WhereCondition>,
    pub order: Vec<(String, OrderDirection)>,
}

impl PivotDefinition {
    pub fn qualify(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }

    /// Whether attach/update should stamp `created_at`/`updated_at`
    pub fn has_timestamps(&self) -> bool {
        self.timestamps || self.columns.iter().any(|c| c == "created_at" || c == "updated_at")
    }
}

/// Intermediate hop of a through relation
#[derive(Debug, Clone)]
pub struct ThroughDefinition {
    /// Intermediate model name in the registry
    pub through: String,
    pub first_key: String,
    pub second_key: String,
    pub local_key: String,
    pub second_local_key: String,
}
