//! Pivot synchronization: attach, detach, sync and pivot updates

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::backends::{DatabaseValue, Row};
use crate::error::ModelResult;

use super::belongs_to_many::{pivot_row, BelongsToMany};

/// Related ids to attach or sync, each with pivot attributes
#[derive(Debug, Clone, Default)]
pub struct SyncIds {
    entries: Vec<(DatabaseValue, Row)>,
}

impl SyncIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id<K: Into<DatabaseValue>>(mut self, id: K) -> Self {
        self.entries.push((id.into(), Row::new()));
        self
    }

    pub fn with_attributes<K: Into<DatabaseValue>>(mut self, id: K, attributes: Row) -> Self {
        self.entries.push((id.into(), attributes));
        self
    }

    /// Ids paired with their pivot attributes
    pub fn from_pairs<K: Into<DatabaseValue>>(entries: Vec<(K, Row)>) -> Self {
        entries
            .into_iter()
            .fold(SyncIds::new(), |ids, (id, attributes)| ids.with_attributes(id, attributes))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DatabaseValue, Row)> {
        self.entries.iter()
    }
}

impl<K: Into<DatabaseValue>> From<Vec<K>> for SyncIds {
    fn from(ids: Vec<K>) -> Self {
        ids.into_iter().fold(SyncIds::new(), SyncIds::id)
    }
}

impl<K: Into<DatabaseValue>, const N: usize> From<[K; N]> for SyncIds {
    fn from(ids: [K; N]) -> Self {
        ids.into_iter().fold(SyncIds::new(), SyncIds::id)
    }
}

/// What a sync changed, keys cast to the related key type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncChanges {
    pub attached: Vec<DatabaseValue>,
    pub detached: Vec<DatabaseValue>,
    pub updated: Vec<DatabaseValue>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty() && self.updated.is_empty()
    }
}

impl BelongsToMany {
    /// Insert one pivot row per id; returns the number of rows inserted
    pub async fn attach<I: Into<SyncIds>>(&self, ids: I) -> ModelResult<u64> {
        let targets = self.normalize(ids.into())?;
        self.insert_pivot_rows(&targets).await
    }

    /// Delete pivot rows of the scoped parent.
    ///
    /// `None` detaches every related row; an empty list detaches nothing and
    /// runs no query.
    pub async fn detach<K: Into<DatabaseValue>>(&self, ids: Option<Vec<K>>) -> ModelResult<u64> {
        let mut query = self.pivot_query()?;
        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(0);
            }
            let related_key = self.base.related.key_type();
            let ids = ids
                .into_iter()
                .map(|id| related_key.cast(&id.into()))
                .collect::<ModelResult<Vec<_>>>()?;
            query = query.where_in(&self.pivot.qualify(&self.pivot.related_pivot_key), ids);
        }
        self.base.ctx.executor().delete(&query).await
    }

    /// Make the given ids the complete set of related rows
    pub async fn sync<I: Into<SyncIds>>(&self, ids: I) -> ModelResult<SyncChanges> {
        self.sync_with_options(ids, true).await
    }

    /// Attach missing ids and update existing ones, detaching nothing
    pub async fn sync_without_detaching<I: Into<SyncIds>>(&self, ids: I) -> ModelResult<SyncChanges> {
        self.sync_with_options(ids, false).await
    }

    /// Sync with the same pivot attributes for every id
    pub async fn sync_with_pivot_values<K: Into<DatabaseValue>>(
        &self,
        ids: Vec<K>,
        values: Row,
    ) -> ModelResult<SyncChanges> {
        let ids = ids
            .into_iter()
            .fold(SyncIds::new(), |acc, id| acc.with_attributes(id, values.clone()));
        self.sync(ids).await
    }

    pub async fn sync_with_options<I: Into<SyncIds>>(&self, ids: I, detaching: bool) -> ModelResult<SyncChanges> {
        let targets = self.normalize(ids.into())?;
        let current = self.current_pivot_rows().await?;
        let mut changes = SyncChanges::default();

        if detaching {
            let wanted: HashSet<String> = targets.iter().filter_map(|(id, _)| id.dictionary_key()).collect();
            changes.detached = current
                .iter()
                .filter(|(key, _)| key.dictionary_key().map_or(false, |k| !wanted.contains(&k)))
                .map(|(key, _)| key.clone())
                .collect();
            if !changes.detached.is_empty() {
                self.detach(Some(changes.detached.clone())).await?;
            }
        }

        let existing: HashMap<String, &Row> = current
            .iter()
            .filter_map(|(key, row)| key.dictionary_key().map(|k| (k, row)))
            .collect();

        let mut to_attach = Vec::new();
        for (id, attributes) in &targets {
            let key = match id.dictionary_key() {
                Some(key) => key,
                None => continue,
            };
            match existing.get(&key) {
                None => to_attach.push((id.clone(), attributes.clone())),
                Some(row) if attributes_differ(row, attributes) => {
                    if self.update_existing_pivot(id.clone(), attributes.clone()).await? > 0 {
                        changes.updated.push(id.clone());
                    }
                }
                Some(_) => {}
            }
        }

        if !to_attach.is_empty() {
            self.insert_pivot_rows(&to_attach).await?;
            changes.attached = to_attach.into_iter().map(|(id, _)| id).collect();
        }

        debug!(
            relation = %self.base.definition.name,
            attached = changes.attached.len(),
            detached = changes.detached.len(),
            updated = changes.updated.len(),
            "synced pivot rows"
        );
        Ok(changes)
    }

    /// Update the pivot row of one related id
    pub async fn update_existing_pivot<K: Into<DatabaseValue>>(&self, id: K, attributes: Row) -> ModelResult<u64> {
        let id = self.base.related.key_type().cast(&id.into())?;
        let mut values = attributes;
        if self.pivot.has_timestamps() {
            values
                .entry("updated_at".to_string())
                .or_insert_with(DatabaseValue::now);
        }

        let query = self
            .pivot_query()?
            .where_eq(&self.pivot.qualify(&self.pivot.related_pivot_key), id);
        self.base.ctx.executor().update(&query, &values).await
    }

    /// Ids cast to the related key type, first position kept, last attributes win
    fn normalize(&self, ids: SyncIds) -> ModelResult<Vec<(DatabaseValue, Row)>> {
        let key_type = self.base.related.key_type();
        let mut normalized: Vec<(DatabaseValue, Row)> = Vec::with_capacity(ids.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (id, attributes) in ids.entries {
            let id = key_type.cast(&id)?;
            let key = match id.dictionary_key() {
                Some(key) => key,
                None => continue,
            };
            match positions.get(&key) {
                Some(&index) => normalized[index].1 = attributes,
                None => {
                    positions.insert(key, normalized.len());
                    normalized.push((id, attributes));
                }
            }
        }
        Ok(normalized)
    }

    /// Pivot rows of the scoped parent keyed by the cast related id
    async fn current_pivot_rows(&self) -> ModelResult<Vec<(DatabaseValue, Row)>> {
        let key_type = self.base.related.key_type();
        let rows = self.base.ctx.executor().select(&self.pivot_query()?).await?;

        let mut current = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row
                .get(&self.pivot.related_pivot_key)
                .cloned()
                .unwrap_or(DatabaseValue::Null);
            if key.is_null() {
                continue;
            }
            current.push((key_type.cast(&key)?, row));
        }
        Ok(current)
    }

    async fn insert_pivot_rows(&self, targets: &[(DatabaseValue, Row)]) -> ModelResult<u64> {
        if targets.is_empty() {
            return Ok(0);
        }
        // pivot_query validates the parent scope
        self.pivot_query()?;
        let parent_key = self.parent_key.clone().unwrap_or(DatabaseValue::Null);

        let rows: Vec<Row> = targets
            .iter()
            .map(|(id, attributes)| pivot_row(&self.pivot, &parent_key, id.clone(), attributes))
            .collect();
        self.base.ctx.executor().insert(&self.pivot.table, &rows).await
    }
}

/// True when any given attribute differs from the stored pivot row
fn attributes_differ(row: &Row, attributes: &Row) -> bool {
    attributes.iter().any(|(column, value)| match row.get(column) {
        Some(current) => !current.loosely_equals(value),
        None => true,
    })
}
