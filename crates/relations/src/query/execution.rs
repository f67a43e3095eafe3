//! Query Execution - terminal operations of a ModelQuery

use std::collections::HashSet;

use tracing::debug;

use crate::backends::{DatabaseValue, Row};
use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::loading::{aggregates, eager_loader};
use crate::model::{Model, Timestamped};

use super::model_query::ModelQuery;
use super::pagination::Paginator;

impl ModelQuery {
    /// Fetch the models and eager load the requested relations
    pub async fn get(&self) -> ModelResult<Collection> {
        let mut models = self.get_models().await?;
        if !models.is_empty() {
            self.eager_load_relations(&mut models).await?;
        }
        Ok(Collection::new(models))
    }

    /// Fetch and hydrate without eager loading
    pub async fn get_models(&self) -> ModelResult<Vec<Model>> {
        let rows = self.ctx.executor().select(&self.resolve_builder().await?).await?;
        Ok(rows
            .into_iter()
            .map(|row| Model::from_row(self.model.clone(), row))
            .collect())
    }

    /// Load this query's eager-load paths and relation aggregates onto
    /// already fetched models
    pub async fn eager_load_relations(&self, models: &mut [Model]) -> ModelResult<()> {
        eager_loader::eager_load_relations(self, models).await?;
        aggregates::load_aggregates(self, models).await
    }

    pub async fn first(&self) -> ModelResult<Option<Model>> {
        let mut models = self.clone().limit(1).get_models().await?;
        if models.is_empty() {
            return Ok(None);
        }
        self.eager_load_relations(&mut models).await?;
        Ok(models.into_iter().next())
    }

    pub async fn first_or_fail(&self) -> ModelResult<Model> {
        self.first()
            .await?
            .ok_or_else(|| ModelError::not_found(self.model.name(), Vec::new()))
    }

    pub async fn find<K: Into<DatabaseValue>>(&self, key: K) -> ModelResult<Option<Model>> {
        let column = self.qualify(self.model.primary_key());
        self.clone().where_eq(&column, key).first().await
    }

    pub async fn find_or_fail<K: Into<DatabaseValue>>(&self, key: K) -> ModelResult<Model> {
        let key = key.into();
        self.find(key.clone())
            .await?
            .ok_or_else(|| ModelError::not_found(self.model.name(), vec![key]))
    }

    /// Models for several keys; an empty key list runs no query
    pub async fn find_many<K: Into<DatabaseValue>>(&self, keys: Vec<K>) -> ModelResult<Collection> {
        if keys.is_empty() {
            return Ok(Collection::default());
        }
        let column = self.qualify(self.model.primary_key());
        self.clone().where_in(&column, keys).get().await
    }

    /// Like `find_many`, but fails with the keys that matched no model
    pub async fn find_many_or_fail<K: Into<DatabaseValue>>(&self, keys: Vec<K>) -> ModelResult<Collection> {
        let keys: Vec<DatabaseValue> = keys.into_iter().map(Into::into).collect();
        let found = self.find_many(keys.clone()).await?;

        let present: HashSet<String> = found
            .model_keys()
            .iter()
            .filter_map(DatabaseValue::dictionary_key)
            .collect();
        let mut reported = HashSet::new();
        let missing: Vec<DatabaseValue> = keys
            .into_iter()
            .filter(|key| match key.dictionary_key() {
                Some(k) => !present.contains(&k) && reported.insert(k),
                None => true,
            })
            .collect();

        if missing.is_empty() {
            Ok(found)
        } else {
            Err(ModelError::not_found(self.model.name(), missing))
        }
    }

    pub async fn count(&self) -> ModelResult<u64> {
        let builder = self.resolve_builder().await?;
        self.ctx.executor().count(&builder.without_paging()).await
    }

    pub async fn exists(&self) -> ModelResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// Values of one column across the matching rows
    pub async fn pluck(&self, column: &str) -> ModelResult<Vec<DatabaseValue>> {
        let qualified = self.qualify(column);
        let builder = self.resolve_builder().await?.select(&[qualified.as_str()]);
        let output = builder
            .select_fields()
            .first()
            .map(|field| field.output_name().to_string())
            .unwrap_or_else(|| column.to_string());

        let rows = self.ctx.executor().select(&builder).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(&output).unwrap_or(DatabaseValue::Null))
            .collect())
    }

    /// Update matching rows, stamping `updated_at` on timestamped models
    pub async fn update(&self, values: Row) -> ModelResult<u64> {
        let mut values = values;
        if self.model.uses_timestamps() {
            values
                .entry(self.model.updated_at_column().to_string())
                .or_insert_with(DatabaseValue::now);
        }
        let builder = self.resolve_builder().await?;
        let affected = self.ctx.executor().update(&builder, &values).await?;
        debug!(model = %self.model.name(), affected, "updated rows");
        Ok(affected)
    }

    /// Delete matching rows; soft-deleting models get `deleted_at` set instead
    pub async fn delete(&self) -> ModelResult<u64> {
        match self.model.deleted_at_column() {
            Some(column) => {
                let mut values = Row::new();
                values.insert(column.to_string(), DatabaseValue::now());
                self.update(values).await
            }
            None => self.force_delete().await,
        }
    }

    /// Remove matching rows even when the model soft-deletes
    pub async fn force_delete(&self) -> ModelResult<u64> {
        let builder = self.resolve_builder().await?;
        let affected = self.ctx.executor().delete(&builder).await?;
        debug!(model = %self.model.name(), affected, "deleted rows");
        Ok(affected)
    }

    /// Clear `deleted_at` on matching soft-deleted rows
    pub async fn restore(&self) -> ModelResult<u64> {
        let column = match self.model.deleted_at_column() {
            Some(column) => column.to_string(),
            None => return Ok(0),
        };
        let mut values = Row::new();
        values.insert(column, DatabaseValue::Null);
        self.clone().with_trashed().update(values).await
    }

    /// Add `amount` to `column` on every matching row
    pub async fn increment<T: Into<DatabaseValue>>(&self, column: &str, amount: T) -> ModelResult<u64> {
        self.increment_with(column, amount, Row::new()).await
    }

    /// Like `increment`, also assigning `extra` columns in the same statement
    pub async fn increment_with<T: Into<DatabaseValue>>(&self, column: &str, amount: T, extra: Row) -> ModelResult<u64> {
        let amount = amount.into();
        if amount.as_f64().is_none() {
            return Err(ModelError::InvalidArgument(format!(
                "cannot increment '{}' by a non-numeric amount",
                column
            )));
        }

        let mut extra = extra;
        if self.model.uses_timestamps() {
            extra
                .entry(self.model.updated_at_column().to_string())
                .or_insert_with(DatabaseValue::now);
        }
        let builder = self.resolve_builder().await?;
        let affected = self.ctx.executor().increment(&builder, column, &amount, &extra).await?;
        debug!(model = %self.model.name(), column, affected, "incremented rows");
        Ok(affected)
    }

    pub async fn decrement<T: Into<DatabaseValue>>(&self, column: &str, amount: T) -> ModelResult<u64> {
        self.decrement_with(column, amount, Row::new()).await
    }

    pub async fn decrement_with<T: Into<DatabaseValue>>(&self, column: &str, amount: T, extra: Row) -> ModelResult<u64> {
        let amount = amount.into().negated().ok_or_else(|| {
            ModelError::InvalidArgument(format!("cannot decrement '{}' by a non-numeric amount", column))
        })?;
        self.increment_with(column, amount, extra).await
    }

    /// Delete the models with the given keys; an empty key list runs no query
    pub async fn destroy<K: Into<DatabaseValue>>(&self, keys: Vec<K>) -> ModelResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let column = self.qualify(self.model.primary_key());
        self.clone().where_in(&column, keys).delete().await
    }

    fn where_attributes(&self, attributes: &Row) -> ModelQuery {
        attributes.iter().fold(self.clone(), |query, (column, value)| {
            let column = query.qualify(column);
            query.where_eq(&column, value.clone())
        })
    }

    /// The first model matching `attributes`, or an unsaved one filled with
    /// `attributes` and `values`
    pub async fn first_or_new(&self, attributes: Row, values: Row) -> ModelResult<Model> {
        if let Some(model) = self.where_attributes(&attributes).first().await? {
            return Ok(model);
        }
        let mut model = Model::new(self.model.clone());
        model.fill(attributes);
        model.fill(values);
        Ok(model)
    }

    /// The first model matching `attributes`, inserting one when none does
    pub async fn first_or_create(&self, attributes: Row, values: Row) -> ModelResult<Model> {
        if let Some(model) = self.where_attributes(&attributes).first().await? {
            return Ok(model);
        }
        let mut merged = attributes;
        merged.extend(values);
        self.create(merged).await
    }

    /// Fill `values` into the first model matching `attributes` (or a new
    /// one) and save it
    pub async fn update_or_create(&self, attributes: Row, values: Row) -> ModelResult<Model> {
        let mut model = self.first_or_new(attributes, Row::new()).await?;
        model.fill(values);
        self.ctx.save(&mut model).await?;
        Ok(model)
    }

    /// Insert a new model and return it with its generated key
    pub async fn create(&self, attributes: Row) -> ModelResult<Model> {
        let mut model = Model::new(self.model.clone());
        model.fill(attributes);
        model.touch_timestamps(true);

        let key = self
            .ctx
            .executor()
            .insert_get_id(self.model.table(), model.attributes(), self.model.primary_key())
            .await?;
        model.set_attribute(self.model.primary_key(), key);
        model.set_exists(true);
        model.sync_original();
        Ok(model)
    }

    /// One page of results; `per_page` falls back to the model, then the config
    pub async fn paginate(&self, page: i64, per_page: Option<i64>) -> ModelResult<Paginator> {
        let per_page = per_page
            .or_else(|| self.model.per_page())
            .unwrap_or(self.ctx.config().per_page)
            .max(1);
        let page = page.max(1);

        let total = self.count().await?;
        let items = self.clone().for_page(page, per_page).get().await?;
        Ok(Paginator::new(items, total, per_page, page))
    }

    /// Walk the results `size` models at a time, ordered by primary key unless
    /// the query is already ordered
    pub async fn chunk<F>(&self, size: i64, mut callback: F) -> ModelResult<()>
    where
        F: FnMut(Collection) -> ModelResult<()>,
    {
        if size <= 0 {
            return Err(ModelError::InvalidArgument("chunk size must be positive".to_string()));
        }

        let mut query = self.clone();
        if query.builder().order_clauses().is_empty() {
            let key = query.qualify(self.model.primary_key());
            query = query.order_by(&key);
        }

        let mut page = 1;
        loop {
            let chunk = query.clone().for_page(page, size).get().await?;
            let fetched = chunk.len() as i64;
            if fetched == 0 {
                break;
            }
            callback(chunk)?;
            if fetched < size {
                break;
            }
            page += 1;
        }
        Ok(())
    }
}
