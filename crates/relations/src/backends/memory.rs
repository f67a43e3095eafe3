//! In-memory executor
//!
//! Evaluates the full [`QueryBuilder`] surface (aliases, joins, where
//! operators, ordering, paging, projection) against rows kept in a
//! `DashMap`. Every statement is recorded so callers can assert on how many
//! queries an operation issued.

use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::core::{DatabaseValue, QueryExecutor, Row};
use crate::error::{ModelError, OrmResult};
use crate::query::{JoinType, OrderDirection, QueryBuilder, QueryOperator, WhereCondition};

/// Kind of statement recorded in the query log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// One executed statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedStatement {
    pub kind: StatementKind,
    pub table: String,
}

/// Rows of every source table participating in one candidate result row
type Tuple = Vec<(String, Row)>;

/// Schemaless table store implementing [`QueryExecutor`]
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: DashMap<String, Vec<Row>>,
    log: Mutex<Vec<LoggedStatement>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows into a table without recording statements
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current contents of a table
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.snapshot(table)
    }

    /// Number of statements executed since creation or the last reset
    pub fn query_count(&self) -> usize {
        self.lock_log().len()
    }

    /// Statements executed since creation or the last reset
    pub fn statements(&self) -> Vec<LoggedStatement> {
        self.lock_log().clone()
    }

    pub fn reset_query_log(&self) {
        self.lock_log().clear();
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<LoggedStatement>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, kind: StatementKind, table: &str) {
        debug!(?kind, table, "memory executor statement");
        self.lock_log().push(LoggedStatement {
            kind,
            table: table.to_string(),
        });
    }

    fn snapshot(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    /// Joined and filtered tuples, before ordering and paging
    fn matching_tuples(&self, query: &QueryBuilder) -> OrmResult<Vec<Tuple>> {
        let from = query
            .from_table()
            .ok_or_else(|| ModelError::Query("select requires a FROM table".to_string()))?;

        let source = from.reference_name().to_string();
        let mut tuples: Vec<Tuple> = self
            .snapshot(&from.name)
            .into_iter()
            .map(|row| vec![(source.clone(), row)])
            .collect();

        for join in query.joins() {
            let rows = self.snapshot(&join.table.name);
            let name = join.table.reference_name().to_string();
            let mut joined = Vec::new();

            for tuple in tuples {
                let mut matched = false;
                for row in &rows {
                    let mut candidate = tuple.clone();
                    candidate.push((name.clone(), row.clone()));
                    if join_matches(&candidate, &join.on_conditions)? {
                        matched = true;
                        joined.push(candidate);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut candidate = tuple;
                    candidate.push((name.clone(), Row::new()));
                    joined.push(candidate);
                }
            }
            tuples = joined;
        }

        let mut filtered = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if where_matches(&tuple, query)? {
                filtered.push(tuple);
            }
        }
        Ok(filtered)
    }

    fn next_key(&self, table: &str, key_name: &str) -> i64 {
        self.tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get(key_name).and_then(DatabaseValue::as_i64))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            + 1
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        let table = query.from_table().map(|t| t.name.clone()).unwrap_or_default();
        self.record(StatementKind::Select, &table);

        let tuples = self.matching_tuples(query)?;
        let tuples = order_tuples(tuples, query.order_clauses())?;

        let offset = query.offset_value().unwrap_or(0).max(0) as usize;
        let limit = query.limit_count().map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        let mut rows = Vec::new();
        let mut seen = Vec::new();
        for tuple in tuples.into_iter().skip(offset).take(limit) {
            let row = project(&tuple, query)?;
            if query.is_distinct() {
                let signature = row_signature(&row);
                if seen.contains(&signature) {
                    continue;
                }
                seen.push(signature);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let table = query.from_table().map(|t| t.name.clone()).unwrap_or_default();
        self.record(StatementKind::Count, &table);

        let tuples = self.matching_tuples(query)?;
        if !query.is_distinct() {
            return Ok(tuples.len() as u64);
        }

        let mut seen = Vec::new();
        for tuple in &tuples {
            let signature = row_signature(&project(tuple, query)?);
            if !seen.contains(&signature) {
                seen.push(signature);
            }
        }
        Ok(seen.len() as u64)
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> OrmResult<u64> {
        self.record(StatementKind::Insert, table);
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn insert_get_id(&self, table: &str, row: &Row, key_name: &str) -> OrmResult<DatabaseValue> {
        self.record(StatementKind::Insert, table);

        let mut row = row.clone();
        let key = match row.get(key_name) {
            Some(key) if !key.is_null() => key.clone(),
            _ => {
                let key = DatabaseValue::Int64(self.next_key(table, key_name));
                row.insert(key_name.to_string(), key.clone());
                key
            }
        };

        self.tables.entry(table.to_string()).or_default().push(row);
        Ok(key)
    }

    async fn update(&self, query: &QueryBuilder, values: &Row) -> OrmResult<u64> {
        let from = writable_table(query, "update")?;
        self.record(StatementKind::Update, &from.name);

        let source = from.reference_name().to_string();
        let mut rows = self.tables.entry(from.name.clone()).or_default();
        let mut affected = 0;

        for row in rows.iter_mut() {
            let tuple = vec![(source.clone(), row.clone())];
            if where_matches(&tuple, query)? {
                for (column, value) in values {
                    let bare = column.rsplit('.').next().unwrap_or(column);
                    row.insert(bare.to_string(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn increment(&self, query: &QueryBuilder, column: &str, amount: &DatabaseValue, extra: &Row) -> OrmResult<u64> {
        let from = writable_table(query, "increment")?;
        self.record(StatementKind::Update, &from.name);

        let column = column.rsplit('.').next().unwrap_or(column).to_string();
        let source = from.reference_name().to_string();
        let mut rows = self.tables.entry(from.name.clone()).or_default();
        let mut affected = 0;

        for row in rows.iter_mut() {
            let tuple = vec![(source.clone(), row.clone())];
            if !where_matches(&tuple, query)? {
                continue;
            }
            let current = row.get(&column).cloned().unwrap_or(DatabaseValue::Null);
            let next = current.checked_add(amount).ok_or_else(|| {
                ModelError::Query(format!("cannot increment non-numeric column \"{}\"", column))
            })?;
            row.insert(column.clone(), next);
            for (name, value) in extra {
                let bare = name.rsplit('.').next().unwrap_or(name);
                row.insert(bare.to_string(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let from = writable_table(query, "delete")?;
        self.record(StatementKind::Delete, &from.name);

        let source = from.reference_name().to_string();
        let mut rows = self.tables.entry(from.name.clone()).or_default();

        let mut keep = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let tuple = vec![(source.clone(), row.clone())];
            keep.push(!where_matches(&tuple, query)?);
        }

        let before = rows.len();
        let mut flags = keep.into_iter();
        rows.retain(|_| flags.next().unwrap_or(true));
        Ok((before - rows.len()) as u64)
    }
}

fn writable_table<'q>(query: &'q QueryBuilder, operation: &str) -> OrmResult<&'q crate::query::TableRef> {
    if query.has_joins() {
        return Err(ModelError::Query(format!("{} does not support joined queries", operation)));
    }
    query
        .from_table()
        .ok_or_else(|| ModelError::Query(format!("{} requires a FROM table", operation)))
}

fn resolve(tuple: &[(String, Row)], column: &str) -> OrmResult<DatabaseValue> {
    match column.rsplit_once('.') {
        Some((table, name)) => {
            let (_, row) = tuple
                .iter()
                .find(|(source, _)| source == table)
                .ok_or_else(|| ModelError::Query(format!("missing FROM-clause entry for table \"{}\"", table)))?;
            Ok(row.get(name).cloned().unwrap_or(DatabaseValue::Null))
        }
        None => Ok(tuple
            .iter()
            .find_map(|(_, row)| row.get(column).cloned())
            .unwrap_or(DatabaseValue::Null)),
    }
}

fn join_matches(tuple: &[(String, Row)], on: &[(String, String)]) -> OrmResult<bool> {
    for (left, right) in on {
        let left = resolve(tuple, left)?;
        let right = resolve(tuple, right)?;
        if left.is_null() || right.is_null() || !left.loosely_equals(&right) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn where_matches(tuple: &[(String, Row)], query: &QueryBuilder) -> OrmResult<bool> {
    if !all_conditions_match(tuple, query.where_conditions())? {
        return Ok(false);
    }
    for group in query.where_groups() {
        let mut any = false;
        for conjunction in group {
            if all_conditions_match(tuple, conjunction)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_conditions_match(tuple: &[(String, Row)], conditions: &[WhereCondition]) -> OrmResult<bool> {
    for condition in conditions {
        if !condition_matches(tuple, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn condition_matches(tuple: &[(String, Row)], condition: &WhereCondition) -> OrmResult<bool> {
    let left = resolve(tuple, &condition.column)?;

    let matched = match condition.operator {
        QueryOperator::IsNull => left.is_null(),
        QueryOperator::IsNotNull => !left.is_null(),
        QueryOperator::In => !left.is_null() && condition.values.iter().any(|v| left.loosely_equals(v)),
        QueryOperator::NotIn => !left.is_null() && !condition.values.iter().any(|v| left.loosely_equals(v)),
        QueryOperator::Between => match condition.values.as_slice() {
            [low, high] => {
                matches!(left.compare(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(left.compare(high), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        },
        _ => {
            let right = condition.value.clone().unwrap_or(DatabaseValue::Null);
            match condition.operator {
                QueryOperator::Equal if right.is_null() => left.is_null(),
                QueryOperator::NotEqual if right.is_null() => !left.is_null(),
                _ if left.is_null() => false,
                QueryOperator::Equal => left.loosely_equals(&right),
                QueryOperator::NotEqual => !left.loosely_equals(&right),
                QueryOperator::GreaterThan => left.compare(&right) == Some(Ordering::Greater),
                QueryOperator::GreaterThanOrEqual => {
                    matches!(left.compare(&right), Some(Ordering::Greater | Ordering::Equal))
                }
                QueryOperator::LessThan => left.compare(&right) == Some(Ordering::Less),
                QueryOperator::LessThanOrEqual => {
                    matches!(left.compare(&right), Some(Ordering::Less | Ordering::Equal))
                }
                QueryOperator::Like | QueryOperator::NotLike => {
                    let text = left.dictionary_key().unwrap_or_default();
                    let pattern = right.dictionary_key().unwrap_or_default();
                    like_matches(&text, &pattern) == (condition.operator == QueryOperator::Like)
                }
                _ => false,
            }
        }
    };
    Ok(matched)
}

/// SQL LIKE with `%` and `_` wildcards
fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matches[j] == pattern[..i] matches text[..j]
    let mut matches = vec![false; text.len() + 1];
    matches[0] = true;

    for &p in &pattern {
        let mut next = vec![false; text.len() + 1];
        if p == '%' {
            let mut any = false;
            for j in 0..=text.len() {
                any |= matches[j];
                next[j] = any;
            }
        } else {
            for j in 1..=text.len() {
                next[j] = matches[j - 1] && (p == '_' || p == text[j - 1]);
            }
        }
        matches = next;
    }
    matches[text.len()]
}

fn order_tuples(tuples: Vec<Tuple>, order: &[(String, OrderDirection)]) -> OrmResult<Vec<Tuple>> {
    if order.is_empty() {
        return Ok(tuples);
    }

    let mut keyed = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let mut keys = Vec::with_capacity(order.len());
        for (column, _) in order {
            keys.push(resolve(&tuple, column)?);
        }
        keyed.push((keys, tuple));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for ((left, right), (_, direction)) in a.iter().zip(b.iter()).zip(order) {
            // NULLS LAST ascending, NULLS FIRST descending
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
            };
            let ordering = match direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(keyed.into_iter().map(|(_, tuple)| tuple).collect())
}

fn project(tuple: &[(String, Row)], query: &QueryBuilder) -> OrmResult<Row> {
    let mut output = Row::new();

    if query.select_fields().is_empty() {
        for (_, row) in tuple {
            output.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        return Ok(output);
    }

    for field in query.select_fields() {
        if field.expression == "*" {
            for (_, row) in tuple {
                output.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        } else if let Some(table) = field.expression.strip_suffix(".*") {
            let (_, row) = tuple
                .iter()
                .find(|(source, _)| source == table)
                .ok_or_else(|| ModelError::Query(format!("missing FROM-clause entry for table \"{}\"", table)))?;
            output.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else {
            let value = resolve(tuple, &field.expression)?;
            output.insert(field.output_name().to_string(), value);
        }
    }
    Ok(output)
}

fn row_signature(row: &Row) -> Vec<(String, String)> {
    let mut signature: Vec<(String, String)> = row
        .iter()
        .map(|(k, v)| (k.clone(), format!("{:?}", v)))
        .collect();
    signature.sort();
    signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::row_from_json;
    use serde_json::json;

    fn executor() -> MemoryExecutor {
        let executor = MemoryExecutor::new();
        executor.seed(
            "users",
            vec![
                row_from_json(json!({"id": 1, "name": "Ann"})),
                row_from_json(json!({"id": 2, "name": "Bob"})),
                row_from_json(json!({"id": 3, "name": "Cid", "deleted_at": "2024-01-01"})),
            ],
        );
        executor.seed(
            "posts",
            vec![
                row_from_json(json!({"id": 10, "user_id": 1})),
                row_from_json(json!({"id": 11, "user_id": 1})),
                row_from_json(json!({"id": 12, "user_id": 2})),
            ],
        );
        executor
    }

    #[tokio::test]
    async fn test_select_with_where_order_and_limit() {
        let executor = executor();
        let query = QueryBuilder::table("users")
            .where_null("users.deleted_at")
            .order_by_desc("users.id")
            .limit(1);

        let rows = executor.select(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], DatabaseValue::from("Bob"));
        assert_eq!(executor.query_count(), 1);
    }

    #[tokio::test]
    async fn test_join_with_alias_and_projection() {
        let executor = executor();
        let query = QueryBuilder::table("posts")
            .select(&["posts.*", "owners.name as owner_name"])
            .join("users as owners", "owners.id", "posts.user_id")
            .where_in("owners.id", vec![1]);

        let rows = executor.select(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["owner_name"] == DatabaseValue::from("Ann")));
    }

    #[tokio::test]
    async fn test_unknown_table_reference_is_an_error() {
        let executor = executor();
        let query = QueryBuilder::table("posts").where_eq("users.id", 1);
        assert!(matches!(executor.select(&query).await, Err(ModelError::Query(_))));
    }

    #[tokio::test]
    async fn test_insert_get_id_update_and_delete() {
        let executor = executor();
        let id = executor
            .insert_get_id("users", &row_from_json(json!({"name": "Dee"})), "id")
            .await
            .unwrap();
        assert_eq!(id, DatabaseValue::Int64(4));

        let mut values = Row::new();
        values.insert("name".to_string(), DatabaseValue::from("Dora"));
        let updated = executor
            .update(&QueryBuilder::table("users").where_eq("users.id", 4), &values)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = executor
            .delete(&QueryBuilder::table("users").where_gt("users.id", 2))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(executor.rows("users").len(), 2);
    }

    #[tokio::test]
    async fn test_where_groups_and_increment() {
        let executor = executor();
        let query = QueryBuilder::table("users").where_any(vec![
            vec![WhereCondition::unary("users.deleted_at", QueryOperator::IsNotNull)],
            vec![WhereCondition::compare("users.name", QueryOperator::Equal, "Ann")],
        ]);
        let rows = executor.select(&query).await.unwrap();
        assert_eq!(rows.len(), 2);

        let nothing = QueryBuilder::table("users").where_any(Vec::new());
        assert!(executor.select(&nothing).await.unwrap().is_empty());

        let mut extra = Row::new();
        extra.insert("edited".to_string(), DatabaseValue::Bool(true));
        let posts = QueryBuilder::table("posts").where_eq("posts.user_id", 1);
        executor.increment(&posts, "posts.id", &DatabaseValue::Int64(100), &extra).await.unwrap();
        let ids: Vec<i64> = executor
            .rows("posts")
            .iter()
            .filter_map(|row| row.get("id").and_then(DatabaseValue::as_i64))
            .collect();
        assert_eq!(ids, vec![110, 111, 12]);
        assert_eq!(executor.rows("posts")[0]["edited"], DatabaseValue::Bool(true));
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_matches("hello", "h%"));
        assert!(like_matches("hello", "h_llo"));
        assert!(like_matches("hello", "%"));
        assert!(!like_matches("hello", "h_lo"));
        assert!(like_matches("", "%"));
    }
}
