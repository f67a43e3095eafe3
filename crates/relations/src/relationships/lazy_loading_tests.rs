//! Lazy relation access and relation writes

use crate::backends::{row_from_json, DatabaseValue};
use crate::error::ModelError;
use crate::model::RelationValue;
use crate::testing::blog_context;

use serde_json::json;

fn keys(value: &RelationValue) -> Vec<i64> {
    value
        .as_many()
        .map(|many| many.iter().filter_map(|m| m.key().as_i64()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_related_runs_one_scoped_query() {
    let (ctx, executor) = blog_context();
    let ana = ctx.query("User").unwrap().find(1).await.unwrap().unwrap();

    executor.reset_query_log();
    let posts = ctx.related(&ana, "posts").await.unwrap();
    assert_eq!(keys(&posts), vec![10, 11]);
    assert_eq!(executor.query_count(), 1);
    // Not cached on the parent
    assert!(!ana.relation_loaded("posts"));
}

#[tokio::test]
async fn test_null_foreign_key_skips_the_query() {
    let (ctx, executor) = blog_context();
    let root = ctx.query("Post").unwrap().find(10).await.unwrap().unwrap();

    executor.reset_query_log();
    let parent = ctx.related(&root, "parent").await.unwrap();
    assert!(matches!(parent, RelationValue::One(None)));
    assert_eq!(executor.query_count(), 0);
}

#[tokio::test]
async fn test_missing_has_one_returns_the_default() {
    let (ctx, _) = blog_context();
    let bea = ctx.query("User").unwrap().find(2).await.unwrap().unwrap();

    let profile = ctx.related(&bea, "profile").await.unwrap();
    let profile = profile.as_one().unwrap();
    assert!(!profile.exists());
    assert_eq!(profile.attribute("bio"), DatabaseValue::from("none"));
}

#[tokio::test]
async fn test_load_relation_caches_the_value() {
    let (ctx, _) = blog_context();
    let mut ana = ctx.query("User").unwrap().find(1).await.unwrap().unwrap();

    ctx.load_relation(&mut ana, "roles").await.unwrap();
    let roles = ana.related_many("roles").unwrap();
    assert_eq!(roles.len(), 2);
    assert!(roles.iter().all(|role| role.pivot().is_some()));
}

#[tokio::test]
async fn test_typed_accessor_rejects_other_kinds() {
    let (ctx, _) = blog_context();
    let ana = ctx.query("User").unwrap().find(1).await.unwrap().unwrap();

    assert!(matches!(ctx.belongs_to(&ana, "posts"), Err(ModelError::Relationship(_))));
    assert!(matches!(
        ctx.belongs_to_many(&ana, "followers"),
        Err(ModelError::RelationNotFound { .. })
    ));
}

#[tokio::test]
async fn test_associate_and_dissociate() {
    let (ctx, _) = blog_context();
    let bea = ctx.query("User").unwrap().find(2).await.unwrap().unwrap();
    let mut reply = ctx.query("Post").unwrap().find(14).await.unwrap().unwrap();

    let author = ctx.belongs_to(&reply, "author").unwrap();
    author.associate(&mut reply, &bea);
    assert_eq!(reply.attribute("user_id"), DatabaseValue::Int64(2));
    assert_eq!(reply.related_one("author").unwrap().key(), DatabaseValue::Int64(2));

    ctx.save(&mut reply).await.unwrap();
    let stored = ctx.query("Post").unwrap().find(14).await.unwrap().unwrap();
    assert_eq!(stored.attribute("user_id"), DatabaseValue::Int64(2));

    author.dissociate(&mut reply);
    assert!(reply.attribute("user_id").is_null());
    assert!(matches!(reply.get_relation("author"), Some(RelationValue::One(None))));
}

#[tokio::test]
async fn test_create_through_has_many() {
    let (ctx, executor) = blog_context();
    let cy = ctx.query("User").unwrap().find(3).await.unwrap().unwrap();

    let posts = ctx.has_one_or_many(&cy, "posts").unwrap();
    let post = posts
        .create(&cy, row_from_json(json!({"title": "Fresh", "deleted_at": null})))
        .await
        .unwrap();

    assert!(post.exists());
    assert_eq!(post.key(), DatabaseValue::Int64(15));
    assert_eq!(post.attribute("user_id"), DatabaseValue::Int64(3));
    assert_eq!(executor.rows("posts").len(), 6);

    let posts = ctx.related(&cy, "posts").await.unwrap();
    assert_eq!(keys(&posts), vec![14, 15]);
}
