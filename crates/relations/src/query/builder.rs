//! Query Builder - Core builder implementation

use super::types::*;

/// Engine-level SELECT description handed to a [`QueryExecutor`](crate::backends::QueryExecutor).
///
/// Updates and deletes reuse the FROM table and WHERE clause of a builder.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    pub(crate) select_fields: Vec<SelectColumn>,
    pub(crate) from_table: Option<TableRef>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) where_groups: Vec<WhereGroup>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    pub(crate) distinct: bool,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `QueryBuilder::new().from(table)`
    pub fn table(table: &str) -> Self {
        Self::new().from(table)
    }

    /// Set the FROM table; accepts `"table"` or `"table as alias"`
    pub fn from(mut self, table: &str) -> Self {
        self.from_table = Some(TableRef::parse(table));
        self
    }

    /// Replace the projected columns
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select_fields = columns.iter().map(|c| SelectColumn::parse(c)).collect();
        self
    }

    /// Append projected columns
    pub fn add_select(mut self, columns: &[&str]) -> Self {
        self.select_fields
            .extend(columns.iter().map(|c| SelectColumn::parse(c)));
        self
    }

    /// Select DISTINCT rows
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Qualify a bare column with the FROM table (or its alias)
    pub fn qualify(&self, column: &str) -> String {
        if column.contains('.') {
            return column.to_string();
        }
        match &self.from_table {
            Some(table) => format!("{}.{}", table.reference_name(), column),
            None => column.to_string(),
        }
    }

    pub fn from_table(&self) -> Option<&TableRef> {
        self.from_table.as_ref()
    }

    pub fn select_fields(&self) -> &[SelectColumn] {
        &self.select_fields
    }

    pub fn where_conditions(&self) -> &[WhereCondition] {
        &self.where_conditions
    }

    pub fn where_groups(&self) -> &[WhereGroup] {
        &self.where_groups
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    pub fn order_clauses(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }

    pub fn limit_count(&self) -> Option<i64> {
        self.limit_count
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset_value
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Copy of this builder without ORDER BY, LIMIT and OFFSET, for counting
    pub fn without_paging(&self) -> Self {
        let mut query = self.clone();
        query.order_by.clear();
        query.limit_count = None;
        query.offset_value = None;
        query
    }

    pub(crate) fn push_where(mut self, condition: WhereCondition) -> Self {
        self.where_conditions.push(condition);
        self
    }

    /// Every condition of the WHERE clause as alternatives of plain
    /// conjunctions, with the groups distributed over the plain conditions
    pub(crate) fn where_alternatives(&self) -> WhereGroup {
        let mut alternatives = vec![self.where_conditions.clone()];
        for group in &self.where_groups {
            let mut expanded = Vec::with_capacity(alternatives.len() * group.len());
            for prefix in &alternatives {
                for alternative in group {
                    let mut conjunction = prefix.clone();
                    conjunction.extend(alternative.iter().cloned());
                    expanded.push(conjunction);
                }
            }
            alternatives = expanded;
        }
        alternatives
    }

    pub(crate) fn clear_where(&mut self) {
        self.where_conditions.clear();
        self.where_groups.clear();
    }

    pub(crate) fn push_order(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_uses_alias() {
        let query = QueryBuilder::table("posts as parent_posts");
        assert_eq!(query.qualify("id"), "parent_posts.id");
        assert_eq!(query.qualify("users.id"), "users.id");
    }

    #[test]
    fn test_where_alternatives_distribute_groups() {
        let query = QueryBuilder::table("users")
            .where_eq("users.active", true)
            .where_any(vec![
                vec![WhereCondition::unary("users.country_id", QueryOperator::IsNull)],
                vec![WhereCondition::compare("users.country_id", QueryOperator::Equal, 1)],
            ]);

        let alternatives = query.where_alternatives();
        assert_eq!(alternatives.len(), 2);
        assert!(alternatives.iter().all(|conjunction| conjunction.len() == 2));
        assert_eq!(alternatives[1][1].operator, QueryOperator::Equal);
    }

    #[test]
    fn test_select_and_add_select() {
        let query = QueryBuilder::table("users")
            .select(&["users.*"])
            .add_select(&["role_user.role_id as pivot_role_id"]);
        assert_eq!(query.select_fields().len(), 2);
        assert_eq!(query.select_fields()[1].output_name(), "pivot_role_id");
    }
}
