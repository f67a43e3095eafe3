//! Terminal query operations against the seeded blog schema

use crate::backends::{row_from_json, DatabaseValue};
use crate::error::ModelError;
use crate::testing::blog_context;

use serde_json::json;

#[tokio::test]
async fn test_soft_deleted_rows_are_hidden_by_default() {
    let (ctx, _) = blog_context();
    let posts = ctx.query("Post").unwrap();

    assert_eq!(posts.count().await.unwrap(), 4);
    assert_eq!(posts.clone().with_trashed().count().await.unwrap(), 5);
    assert_eq!(posts.clone().only_trashed().count().await.unwrap(), 1);
    assert!(posts.find(13).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_restore_and_force_delete() {
    let (ctx, executor) = blog_context();
    let posts = ctx.query("Post").unwrap();

    assert_eq!(posts.clone().where_eq("posts.id", 12).delete().await.unwrap(), 1);
    assert_eq!(posts.count().await.unwrap(), 3);
    assert_eq!(executor.rows("posts").len(), 5);

    assert_eq!(posts.clone().where_eq("posts.id", 12).restore().await.unwrap(), 1);
    assert_eq!(posts.count().await.unwrap(), 4);

    assert_eq!(posts.clone().with_trashed().where_eq("posts.id", 13).force_delete().await.unwrap(), 1);
    assert_eq!(executor.rows("posts").len(), 4);
}

#[tokio::test]
async fn test_paginate() {
    let (ctx, _) = blog_context();
    let page = ctx
        .query("Post")
        .unwrap()
        .order_by("posts.id")
        .paginate(2, Some(3))
        .await
        .unwrap();

    assert_eq!(page.total, 4);
    assert_eq!(page.last_page, 2);
    assert_eq!(page.current_page, 2);
    assert!(!page.has_more_pages);
    assert_eq!(page.items.model_keys(), vec![DatabaseValue::Int64(14)]);
}

#[tokio::test]
async fn test_chunk_visits_every_row_once() {
    let (ctx, _) = blog_context();
    let mut seen = Vec::new();
    let mut chunks = 0;

    ctx.query("Post")
        .unwrap()
        .chunk(3, |chunk| {
            chunks += 1;
            seen.extend(chunk.model_keys());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(chunks, 2);
    let seen: Vec<i64> = seen.iter().filter_map(DatabaseValue::as_i64).collect();
    assert_eq!(seen, vec![10, 11, 12, 14]);
}

#[tokio::test]
async fn test_find_many_or_fail_reports_missing_keys() {
    let (ctx, executor) = blog_context();
    let users = ctx.query("User").unwrap();

    match users.find_many_or_fail(vec![1, 2, 9]).await {
        Err(ModelError::ModelNotFound { model, keys }) => {
            assert_eq!(model, "User");
            assert_eq!(keys, vec![DatabaseValue::Int32(9)]);
        }
        other => panic!("expected ModelNotFound, got {:?}", other.map(|c| c.len())),
    }

    executor.reset_query_log();
    assert!(users.find_many(Vec::<i64>::new()).await.unwrap().is_empty());
    assert_eq!(executor.query_count(), 0);
}

#[tokio::test]
async fn test_first_or_fail_and_scopes() {
    let (ctx, _) = blog_context();

    let hello = ctx
        .query("Post")
        .unwrap()
        .scope("titled", &[DatabaseValue::from("Hello")])
        .unwrap()
        .first_or_fail()
        .await
        .unwrap();
    assert_eq!(hello.key(), DatabaseValue::Int64(10));

    let missing = ctx.query("Post").unwrap().where_eq("posts.title", "Nope").first_or_fail().await;
    assert!(missing.unwrap_err().is_not_found());

    let unknown = ctx.query("Post").unwrap().scope("popular", &[]);
    assert!(matches!(unknown, Err(ModelError::ScopeNotFound { .. })));
}

#[tokio::test]
async fn test_pluck_and_exists() {
    let (ctx, _) = blog_context();
    let names = ctx.query("User").unwrap().order_by("users.id").pluck("name").await.unwrap();
    assert_eq!(
        names,
        vec![DatabaseValue::from("ana"), DatabaseValue::from("bea"), DatabaseValue::from("cy")]
    );

    assert!(ctx.query("Role").unwrap().where_eq("roles.name", "guest").exists().await.unwrap());
    assert!(!ctx.query("Role").unwrap().where_eq("roles.name", "owner").exists().await.unwrap());
}

#[tokio::test]
async fn test_create_and_save() {
    let (ctx, executor) = blog_context();

    let mut role = ctx
        .query("Role")
        .unwrap()
        .create(row_from_json(json!({"name": "auditor"})))
        .await
        .unwrap();
    assert_eq!(role.key(), DatabaseValue::Int64(5));
    assert!(!role.is_dirty());

    role.set_attribute("name", "reviewer");
    ctx.save(&mut role).await.unwrap();
    let stored = ctx.query("Role").unwrap().find(5).await.unwrap().unwrap();
    assert_eq!(stored.attribute("name"), DatabaseValue::from("reviewer"));

    let mut country = ctx.new_model("Country").unwrap();
    country.set_attribute("code", "IT");
    ctx.save(&mut country).await.unwrap();
    assert!(country.exists());
    assert_eq!(executor.rows("countries").len(), 4);
}

#[tokio::test]
async fn test_update_matching_rows() {
    let (ctx, executor) = blog_context();
    let affected = ctx
        .query("User")
        .unwrap()
        .where_eq("users.country_id", 1)
        .update(row_from_json(json!({"country_id": 3})))
        .await
        .unwrap();

    assert_eq!(affected, 2);
    let moved = executor
        .rows("users")
        .iter()
        .filter(|row| row.get("country_id") == Some(&DatabaseValue::Int64(3)))
        .count();
    assert_eq!(moved, 2);
}

fn country_of(executor: &crate::backends::MemoryExecutor, user_id: i64) -> Option<DatabaseValue> {
    executor
        .rows("users")
        .into_iter()
        .find(|row| row.get("id") == Some(&DatabaseValue::Int64(user_id)))
        .and_then(|row| row.get("country_id").cloned())
}

#[tokio::test]
async fn test_first_or_new_and_first_or_create() {
    let (ctx, executor) = blog_context();
    let users = ctx.query("User").unwrap();

    let ana = users
        .first_or_new(row_from_json(json!({"name": "ana"})), row_from_json(json!({"country_id": 3})))
        .await
        .unwrap();
    assert!(ana.exists());
    assert_eq!(ana.attribute("country_id"), DatabaseValue::Int64(1));

    let dee = users
        .first_or_new(row_from_json(json!({"name": "dee"})), row_from_json(json!({"country_id": 3})))
        .await
        .unwrap();
    assert!(!dee.exists());
    assert_eq!(dee.attribute("country_id"), DatabaseValue::Int64(3));
    assert_eq!(executor.rows("users").len(), 3);

    let created = users
        .first_or_create(row_from_json(json!({"name": "dee"})), row_from_json(json!({"country_id": 3})))
        .await
        .unwrap();
    assert_eq!(created.key(), DatabaseValue::Int64(4));

    executor.reset_query_log();
    let again = users
        .first_or_create(row_from_json(json!({"name": "dee"})), row_from_json(json!({"country_id": 2})))
        .await
        .unwrap();
    assert_eq!(again.key(), DatabaseValue::Int64(4));
    assert_eq!(executor.query_count(), 1);
    assert_eq!(executor.rows("users").len(), 4);
}

#[tokio::test]
async fn test_update_or_create() {
    let (ctx, executor) = blog_context();
    let users = ctx.query("User").unwrap();

    let ana = users
        .update_or_create(row_from_json(json!({"name": "ana"})), row_from_json(json!({"country_id": 3})))
        .await
        .unwrap();
    assert_eq!(ana.key(), DatabaseValue::Int64(1));
    assert_eq!(country_of(&executor, 1), Some(DatabaseValue::Int64(3)));

    let eve = users
        .update_or_create(row_from_json(json!({"name": "eve"})), row_from_json(json!({"country_id": 2})))
        .await
        .unwrap();
    assert!(eve.exists());
    assert_eq!(country_of(&executor, 4), Some(DatabaseValue::Int64(2)));
}

#[tokio::test]
async fn test_increment_and_decrement() {
    let (ctx, executor) = blog_context();
    let users = ctx.query("User").unwrap();

    assert_eq!(users.clone().where_eq("users.id", 3).increment("country_id", 2).await.unwrap(), 1);
    assert_eq!(country_of(&executor, 3), Some(DatabaseValue::Int64(4)));

    assert_eq!(users.clone().has("roles").decrement("country_id", 1).await.unwrap(), 2);
    assert_eq!(country_of(&executor, 1), Some(DatabaseValue::Int64(0)));
    assert_eq!(country_of(&executor, 2), Some(DatabaseValue::Int64(0)));
    assert_eq!(country_of(&executor, 3), Some(DatabaseValue::Int64(4)));

    let not_a_number = users.clone().increment("country_id", "many").await;
    assert!(matches!(not_a_number, Err(ModelError::InvalidArgument(_))));

    let text_column = users.increment("name", 1).await;
    assert!(matches!(text_column, Err(ModelError::Query(_))));
}

#[tokio::test]
async fn test_destroy() {
    let (ctx, executor) = blog_context();
    let posts = ctx.query("Post").unwrap();

    executor.reset_query_log();
    assert_eq!(posts.destroy(Vec::<i64>::new()).await.unwrap(), 0);
    assert_eq!(executor.query_count(), 0);

    assert_eq!(posts.destroy(vec![11, 12]).await.unwrap(), 2);
    assert_eq!(posts.count().await.unwrap(), 2);
    // Soft-deleting models keep their rows
    assert_eq!(executor.rows("posts").len(), 5);

    assert_eq!(ctx.query("Role").unwrap().destroy(vec![4]).await.unwrap(), 1);
    assert_eq!(executor.rows("roles").len(), 3);
}
