//! Query Builder SQL generation
//!
//! Turns a [`QueryBuilder`] into parameterized SQL for the SQL executors.
//! Values never appear in the SQL text; they are returned alongside it in
//! placeholder order.

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::{DatabaseValue, Row, SqlDialect};
use crate::error::{ModelError, OrmResult};

struct SqlWriter {
    dialect: SqlDialect,
    sql: String,
    params: Vec<DatabaseValue>,
}

impl SqlWriter {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &DatabaseValue) {
        let placeholder = self.dialect.parameter_placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self.params.push(value.clone());
    }

    fn finish(self) -> (String, Vec<DatabaseValue>) {
        (self.sql, self.params)
    }
}

impl QueryBuilder {
    /// Build the SELECT statement and its parameters
    pub fn to_sql_with_params(&self, dialect: SqlDialect) -> (String, Vec<DatabaseValue>) {
        let mut writer = SqlWriter::new(dialect);
        self.write_select(&mut writer, true);
        writer.finish()
    }

    /// Build a `COUNT(*)` statement over the rows this query matches
    pub fn to_count_sql_with_params(&self, dialect: SqlDialect) -> (String, Vec<DatabaseValue>) {
        let mut writer = SqlWriter::new(dialect);
        if self.distinct {
            writer.push("SELECT COUNT(*) FROM (");
            self.write_select(&mut writer, false);
            writer.push(") AS aggregate");
        } else {
            writer.push("SELECT COUNT(*)");
            self.write_from_where(&mut writer);
        }
        writer.finish()
    }

    /// Build an UPDATE over the FROM table restricted by the WHERE clause
    pub fn to_update_sql_with_params(&self, dialect: SqlDialect, values: &Row) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let table = self.writable_table("update")?;
        if values.is_empty() {
            return Err(ModelError::Query("update requires at least one column".to_string()));
        }

        let mut writer = SqlWriter::new(dialect);
        writer.push(&format!("UPDATE {} SET ", table));
        write_assignments(&mut writer, values, false);
        self.write_where(&mut writer);
        Ok(writer.finish())
    }

    /// Build an UPDATE adding `amount` to `column`, with `extra` assigned alongside
    pub fn to_increment_sql_with_params(
        &self,
        dialect: SqlDialect,
        column: &str,
        amount: &DatabaseValue,
        extra: &Row,
    ) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let table = self.writable_table("increment")?;
        let column = column.rsplit('.').next().unwrap_or(column);

        let mut writer = SqlWriter::new(dialect);
        writer.push(&format!("UPDATE {} SET {} = {} + ", table, column, column));
        writer.bind(amount);
        write_assignments(&mut writer, extra, true);
        self.write_where(&mut writer);
        Ok(writer.finish())
    }

    /// Build a DELETE over the FROM table restricted by the WHERE clause
    pub fn to_delete_sql_with_params(&self, dialect: SqlDialect) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let table = self.writable_table("delete")?;
        let mut writer = SqlWriter::new(dialect);
        writer.push(&format!("DELETE FROM {}", table));
        self.write_where(&mut writer);
        Ok(writer.finish())
    }

    fn writable_table(&self, operation: &str) -> OrmResult<&TableRef> {
        if self.has_joins() {
            return Err(ModelError::Query(format!("{} does not support joined queries", operation)));
        }
        self.from_table
            .as_ref()
            .ok_or_else(|| ModelError::Query(format!("{} requires a FROM table", operation)))
    }

    fn write_select(&self, writer: &mut SqlWriter, with_paging: bool) {
        writer.push(if self.distinct { "SELECT DISTINCT " } else { "SELECT " });

        if self.select_fields.is_empty() {
            writer.push("*");
        } else {
            let columns: Vec<String> = self.select_fields.iter().map(|c| c.to_string()).collect();
            writer.push(&columns.join(", "));
        }

        self.write_from_where(writer);

        if !with_paging {
            return;
        }

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            writer.push(&format!(" ORDER BY {}", clauses.join(", ")));
        }

        if let Some(limit) = self.limit_count {
            writer.push(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            writer.push(&format!(" OFFSET {}", offset));
        }
    }

    fn write_from_where(&self, writer: &mut SqlWriter) {
        if let Some(table) = &self.from_table {
            writer.push(&format!(" FROM {}", table));
        }

        for join in &self.joins {
            writer.push(&format!(" {} {}", join.join_type, join.table));
            if !join.on_conditions.is_empty() {
                let conditions: Vec<String> = join
                    .on_conditions
                    .iter()
                    .map(|(left, right)| format!("{} = {}", left, right))
                    .collect();
                writer.push(&format!(" ON {}", conditions.join(" AND ")));
            }
        }

        self.write_where(writer);
    }

    fn write_where(&self, writer: &mut SqlWriter) {
        if self.where_conditions.is_empty() && self.where_groups.is_empty() {
            return;
        }

        writer.push(" WHERE ");
        let mut first = true;
        for condition in &self.where_conditions {
            if !first {
                writer.push(" AND ");
            }
            first = false;
            write_condition(writer, condition);
        }
        for group in &self.where_groups {
            if !first {
                writer.push(" AND ");
            }
            first = false;
            write_group(writer, group);
        }
    }
}

/// `col = $n` pairs in column order; SET targets may not be qualified
fn write_assignments(writer: &mut SqlWriter, values: &Row, leading_comma: bool) {
    let mut columns: Vec<&String> = values.keys().collect();
    columns.sort();
    for (i, column) in columns.into_iter().enumerate() {
        if i > 0 || leading_comma {
            writer.push(", ");
        }
        let bare = column.rsplit('.').next().unwrap_or(column);
        writer.push(&format!("{} = ", bare));
        writer.bind(&values[column]);
    }
}

fn write_group(writer: &mut SqlWriter, group: &WhereGroup) {
    if group.is_empty() {
        writer.push("1 = 0");
        return;
    }

    writer.push("(");
    for (i, conjunction) in group.iter().enumerate() {
        if i > 0 {
            writer.push(" OR ");
        }
        if conjunction.is_empty() {
            writer.push("1 = 1");
            continue;
        }
        writer.push("(");
        for (j, condition) in conjunction.iter().enumerate() {
            if j > 0 {
                writer.push(" AND ");
            }
            write_condition(writer, condition);
        }
        writer.push(")");
    }
    writer.push(")");
}

fn write_condition(writer: &mut SqlWriter, condition: &WhereCondition) {
    match condition.operator {
        QueryOperator::In | QueryOperator::NotIn => {
            if condition.values.is_empty() {
                // An empty list matches nothing (IN) or everything (NOT IN)
                writer.push(if condition.operator == QueryOperator::In { "1 = 0" } else { "1 = 1" });
                return;
            }
            writer.push(&format!("{} {} (", condition.column, condition.operator));
            for (j, value) in condition.values.iter().enumerate() {
                if j > 0 {
                    writer.push(", ");
                }
                writer.bind(value);
            }
            writer.push(")");
        }
        QueryOperator::Between => {
            writer.push(&format!("{} BETWEEN ", condition.column));
            match condition.values.as_slice() {
                [low, high] => {
                    writer.bind(low);
                    writer.push(" AND ");
                    writer.bind(high);
                }
                _ => writer.push("NULL AND NULL"),
            }
        }
        QueryOperator::IsNull | QueryOperator::IsNotNull => {
            writer.push(&format!("{} {}", condition.column, condition.operator));
        }
        _ => match &condition.value {
            Some(DatabaseValue::Null) | None => {
                let operator = if condition.operator == QueryOperator::NotEqual { "IS NOT NULL" } else { "IS NULL" };
                writer.push(&format!("{} {}", condition.column, operator));
            }
            Some(value) => {
                writer.push(&format!("{} {} ", condition.column, condition.operator));
                writer.bind(value);
            }
        },
    }
}

/// Build a multi-row INSERT; columns missing from a row are written as `DEFAULT`
pub fn insert_sql_with_params(
    dialect: SqlDialect,
    table: &str,
    rows: &[Row],
    returning: Option<&str>,
) -> OrmResult<(String, Vec<DatabaseValue>)> {
    let mut columns: Vec<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    columns.sort();
    columns.dedup();

    if rows.is_empty() || columns.is_empty() {
        return Err(ModelError::Query(format!("nothing to insert into '{}'", table)));
    }

    let column_list: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    let mut writer = SqlWriter::new(dialect);
    writer.push(&format!("INSERT INTO {} ({}) VALUES ", table, column_list.join(", ")));

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.push("(");
        for (j, column) in columns.iter().enumerate() {
            if j > 0 {
                writer.push(", ");
            }
            match row.get(*column) {
                Some(value) => writer.bind(value),
                None => writer.push("DEFAULT"),
            }
        }
        writer.push(")");
    }

    if let Some(key) = returning {
        writer.push(&format!(" RETURNING {}", key));
    }

    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_join_and_in() {
        let query = QueryBuilder::table("roles")
            .select(&["roles.*", "role_user.user_id as pivot_user_id"])
            .join("role_user", "roles.id", "role_user.role_id")
            .where_in("role_user.user_id", vec![1, 2])
            .order_by("roles.id")
            .limit(10);

        let (sql, params) = query.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT roles.*, role_user.user_id AS pivot_user_id FROM roles \
             INNER JOIN role_user ON roles.id = role_user.role_id \
             WHERE role_user.user_id IN ($1, $2) ORDER BY roles.id ASC LIMIT 10"
        );
        assert_eq!(params, vec![DatabaseValue::Int32(1), DatabaseValue::Int32(2)]);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let query = QueryBuilder::table("posts").where_in::<i64>("posts.user_id", Vec::new());
        let (sql, params) = query.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT * FROM posts WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_aliased_from_table() {
        let query = QueryBuilder::table("posts as parent_posts").where_eq("parent_posts.id", 3);
        let (sql, _) = query.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT * FROM posts AS parent_posts WHERE parent_posts.id = $1");
    }

    #[test]
    fn test_count_ignores_paging() {
        let query = QueryBuilder::table("users").where_null("users.deleted_at").limit(5).offset(10);
        let (sql, _) = query.to_count_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT COUNT(*) FROM users WHERE users.deleted_at IS NULL");
    }

    #[test]
    fn test_update_and_delete() {
        let mut values = Row::new();
        values.insert("name".to_string(), DatabaseValue::from("B"));
        let query = QueryBuilder::table("users").where_eq("users.id", 1);

        let (sql, params) = query.to_update_sql_with_params(SqlDialect::PostgreSQL, &values).unwrap();
        assert_eq!(sql, "UPDATE users SET name = $1 WHERE users.id = $2");
        assert_eq!(params.len(), 2);

        let (sql, _) = query.to_delete_sql_with_params(SqlDialect::PostgreSQL).unwrap();
        assert_eq!(sql, "DELETE FROM users WHERE users.id = $1");

        let joined = QueryBuilder::table("users").join("posts", "users.id", "posts.user_id");
        assert!(joined.to_delete_sql_with_params(SqlDialect::PostgreSQL).is_err());
    }

    #[test]
    fn test_where_group_and_increment() {
        let query = QueryBuilder::table("posts")
            .where_eq("posts.user_id", 1)
            .where_any(vec![
                vec![WhereCondition::unary("posts.parent_id", QueryOperator::IsNull)],
                vec![WhereCondition::list("posts.parent_id", QueryOperator::NotIn, vec![DatabaseValue::Int64(10)])],
            ]);
        let (sql, params) = query.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE posts.user_id = $1 AND \
             ((posts.parent_id IS NULL) OR (posts.parent_id NOT IN ($2)))"
        );
        assert_eq!(params.len(), 2);

        let mut extra = Row::new();
        extra.insert("updated_at".to_string(), DatabaseValue::from("now"));
        let (sql, params) = QueryBuilder::table("posts")
            .where_eq("posts.id", 10)
            .to_increment_sql_with_params(SqlDialect::PostgreSQL, "posts.views", &DatabaseValue::Int64(2), &extra)
            .unwrap();
        assert_eq!(sql, "UPDATE posts SET views = views + $1, updated_at = $2 WHERE posts.id = $3");
        assert_eq!(params[0], DatabaseValue::Int64(2));
    }

    #[test]
    fn test_insert_fills_missing_columns_with_default() {
        let mut first = Row::new();
        first.insert("user_id".to_string(), DatabaseValue::Int64(1));
        first.insert("role_id".to_string(), DatabaseValue::Int64(2));
        let mut second = Row::new();
        second.insert("user_id".to_string(), DatabaseValue::Int64(1));

        let (sql, params) =
            insert_sql_with_params(SqlDialect::PostgreSQL, "role_user", &[first, second], None).unwrap();
        assert_eq!(sql, "INSERT INTO role_user (role_id, user_id) VALUES ($1, $2), (DEFAULT, $3)");
        assert_eq!(params.len(), 3);
    }
}
