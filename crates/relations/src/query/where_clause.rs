//! Query Builder WHERE clause operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::DatabaseValue;

impl QueryBuilder {
    fn push_condition(mut self, column: &str, operator: QueryOperator, value: Option<DatabaseValue>, values: Vec<DatabaseValue>) -> Self {
        self.where_conditions.push(WhereCondition {
            column: column.to_string(),
            operator,
            value,
            values,
        });
        self
    }

    /// Require at least one of the alternatives, ANDed with every other condition.
    ///
    /// No alternatives matches nothing; an empty alternative always matches.
    pub fn where_any(mut self, alternatives: WhereGroup) -> Self {
        self.where_groups.push(alternatives);
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::Equal, Some(value.into()), Vec::new())
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::NotEqual, Some(value.into()), Vec::new())
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::GreaterThan, Some(value.into()), Vec::new())
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::GreaterThanOrEqual, Some(value.into()), Vec::new())
    }

    /// Add WHERE condition with less than
    pub fn where_lt<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::LessThan, Some(value.into()), Vec::new())
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
        self.push_condition(column, QueryOperator::LessThanOrEqual, Some(value.into()), Vec::new())
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.push_condition(column, QueryOperator::Like, Some(DatabaseValue::from(pattern)), Vec::new())
    }

    /// Add WHERE condition with NOT LIKE
    pub fn where_not_like(self, column: &str, pattern: &str) -> Self {
        self.push_condition(column, QueryOperator::NotLike, Some(DatabaseValue::from(pattern)), Vec::new())
    }

    /// Add WHERE condition with a custom comparison operator; unknown operators fall back to `=`
    pub fn where_condition<T: Into<DatabaseValue>>(self, column: &str, operator: &str, value: T) -> Self {
        let operator = QueryOperator::parse(operator).unwrap_or(QueryOperator::Equal);
        self.push_condition(column, operator, Some(value.into()), Vec::new())
    }

    /// Add WHERE column IN (...) condition
    pub fn where_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push_condition(column, QueryOperator::In, None, values)
    }

    /// Add WHERE column NOT IN (...) condition
    pub fn where_not_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push_condition(column, QueryOperator::NotIn, None, values)
    }

    /// Add WHERE column IS NULL condition
    pub fn where_null(self, column: &str) -> Self {
        self.push_condition(column, QueryOperator::IsNull, None, Vec::new())
    }

    /// Add WHERE column IS NOT NULL condition
    pub fn where_not_null(self, column: &str) -> Self {
        self.push_condition(column, QueryOperator::IsNotNull, None, Vec::new())
    }

    /// Add WHERE column BETWEEN low AND high condition
    pub fn where_between<T: Into<DatabaseValue>>(self, column: &str, low: T, high: T) -> Self {
        self.push_condition(column, QueryOperator::Between, None, vec![low.into(), high.into()])
    }
}
