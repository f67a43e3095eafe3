//! Query Builder Types - Core types and enums for query building

use std::fmt;

use crate::backends::DatabaseValue;

/// Query operator types
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

impl QueryOperator {
    /// Parse a comparison operator as written in SQL
    pub fn parse(operator: &str) -> Option<Self> {
        match operator.trim().to_uppercase().as_str() {
            "=" => Some(QueryOperator::Equal),
            "!=" | "<>" => Some(QueryOperator::NotEqual),
            ">" => Some(QueryOperator::GreaterThan),
            ">=" => Some(QueryOperator::GreaterThanOrEqual),
            "<" => Some(QueryOperator::LessThan),
            "<=" => Some(QueryOperator::LessThanOrEqual),
            "LIKE" => Some(QueryOperator::Like),
            "NOT LIKE" => Some(QueryOperator::NotLike),
            _ => None,
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
            QueryOperator::Between => write!(f, "BETWEEN"),
        }
    }
}

/// Where clause condition
#[derive(Debug, Clone)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<DatabaseValue>,
    pub values: Vec<DatabaseValue>, // For IN, NOT IN, BETWEEN
}

impl WhereCondition {
    /// Comparison against a single value
    pub fn compare<T: Into<DatabaseValue>>(column: &str, operator: QueryOperator, value: T) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: Some(value.into()),
            values: Vec::new(),
        }
    }

    /// IN, NOT IN or BETWEEN over a list of values
    pub fn list(column: &str, operator: QueryOperator, values: Vec<DatabaseValue>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: None,
            values,
        }
    }

    /// IS NULL or IS NOT NULL
    pub fn unary(column: &str, operator: QueryOperator) -> Self {
        Self::list(column, operator, Vec::new())
    }
}

/// Alternatives of which at least one must hold; each alternative is a
/// conjunction of conditions
pub type WhereGroup = Vec<Vec<WhereCondition>>;

/// A table reference with an optional alias (`posts as parent_posts`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// Parse `"table"` or `"table as alias"`
    pub fn parse(reference: &str) -> Self {
        match split_alias(reference) {
            (name, Some(alias)) => Self::aliased(name, alias),
            (name, None) => Self::new(name),
        }
    }

    /// The name other clauses use to qualify this table's columns
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.name, alias),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A projected column: `posts.*`, `posts.title` or `role_user.role_id as pivot_role_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub expression: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn parse(column: &str) -> Self {
        let (expression, alias) = split_alias(column);
        Self {
            expression: expression.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    /// True for `*` and `table.*`
    pub fn is_wildcard(&self) -> bool {
        self.expression == "*" || self.expression.ends_with(".*")
    }

    /// Column name the value lands under in the fetched row
    pub fn output_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self
                .expression
                .rsplit('.')
                .next()
                .unwrap_or(&self.expression),
        }
    }
}

impl fmt::Display for SelectColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expression, alias),
            None => write!(f, "{}", self.expression),
        }
    }
}

/// Split `"expr as alias"` (case-insensitive `as`) into its parts
fn split_alias(input: &str) -> (&str, Option<&str>) {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    match lower.find(" as ") {
        Some(index) => (trimmed[..index].trim(), Some(trimmed[index + 4..].trim())),
        None => (trimmed, None),
    }
}

/// Join types
#[derive(Debug, Clone, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on_conditions: Vec<(String, String)>, // (left_column, right_column)
}

/// Order by direction
#[derive(Debug, Clone, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_alias_parsing() {
        let table = TableRef::parse("posts as parent_posts");
        assert_eq!(table.name, "posts");
        assert_eq!(table.reference_name(), "parent_posts");
        assert_eq!(TableRef::parse("users").reference_name(), "users");
    }

    #[test]
    fn test_select_column_output_name() {
        assert_eq!(SelectColumn::parse("role_user.role_id AS pivot_role_id").output_name(), "pivot_role_id");
        assert_eq!(SelectColumn::parse("posts.title").output_name(), "title");
        assert!(SelectColumn::parse("posts.*").is_wildcard());
    }
}
