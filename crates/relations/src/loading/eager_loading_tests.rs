//! Eager loading tests against the seeded blog schema

use crate::backends::DatabaseValue;
use crate::collection::Collection;
use crate::config::OrmConfig;
use crate::error::ModelError;
use crate::model::{Model, RelationValue};
use crate::relationships::{make_relation, Relation};
use crate::testing::{blog_context, blog_context_with};

fn keys(collection: &Collection) -> Vec<i64> {
    collection.iter().filter_map(|model| model.key().as_i64()).collect()
}

fn related_keys(model: &Model, relation: &str) -> Vec<i64> {
    model.related_many(relation).map(keys).unwrap_or_default()
}

#[tokio::test]
async fn test_one_query_per_relation_path() {
    let (ctx, executor) = blog_context();
    executor.reset_query_log();

    let users = ctx.query("User").unwrap().with("posts").get().await.unwrap();

    assert_eq!(users.len(), 3);
    assert_eq!(executor.query_count(), 2);
    assert_eq!(related_keys(&users.as_slice()[0], "posts"), vec![10, 11]);
    assert_eq!(related_keys(&users.as_slice()[1], "posts"), vec![12]);
    assert_eq!(related_keys(&users.as_slice()[2], "posts"), vec![14]);
}

#[tokio::test]
async fn test_every_parent_gets_a_slot() {
    let (ctx, _) = blog_context();
    let users = ctx
        .query("User")
        .unwrap()
        .with(["profile", "roles", "country"])
        .get()
        .await
        .unwrap();

    for user in users.iter() {
        assert!(user.relation_loaded("profile"));
        assert!(user.relation_loaded("roles"));
        assert!(user.relation_loaded("country"));
    }

    let ana = users.find(1).unwrap();
    assert_eq!(ana.related_one("profile").unwrap().attribute("bio"), DatabaseValue::from("writer"));

    // Users without a profile get the declared default, pointing back at them
    let bea = users.find(2).unwrap();
    let profile = bea.related_one("profile").unwrap();
    assert!(!profile.exists());
    assert_eq!(profile.attribute("bio"), DatabaseValue::from("none"));
    assert_eq!(profile.attribute("user_id"), DatabaseValue::Int64(2));

    let cy = users.find(3).unwrap();
    assert!(related_keys(cy, "roles").is_empty());
    assert_eq!(cy.related_one("country").unwrap().key(), DatabaseValue::Int64(2));
}

#[tokio::test]
async fn test_nested_paths_add_one_query_per_level() {
    let (ctx, executor) = blog_context();
    executor.reset_query_log();

    let roots = ctx
        .query("Post")
        .unwrap()
        .where_null("posts.parent_id")
        .with("children.children")
        .get()
        .await
        .unwrap();

    assert_eq!(executor.query_count(), 3);
    assert_eq!(keys(&roots), vec![10]);

    let children = roots.first().unwrap().related_many("children").unwrap();
    assert_eq!(keys(children), vec![11, 12]);
    let grandchildren: Vec<Vec<i64>> = children
        .iter()
        .map(|child| related_keys(child, "children"))
        .collect();
    assert_eq!(grandchildren, vec![vec![14], vec![]]);
}

#[tokio::test]
async fn test_self_referencing_relation_uses_an_alias() {
    let (ctx, _) = blog_context();
    let post = ctx.model("Post").unwrap();
    let parent: Box<dyn Relation> = make_relation(&ctx, &post, "parent").unwrap();
    let from = parent.query().builder().from_table().unwrap();
    assert_eq!(from.name, "posts");
    assert_eq!(from.reference_name(), "parent_posts");
    assert_eq!(parent.match_columns().0, "parent_posts.id");

    let posts = ctx
        .query("Post")
        .unwrap()
        .with("parent")
        .order_by("posts.id")
        .get()
        .await
        .unwrap();

    let parents: Vec<Option<i64>> = posts
        .iter()
        .map(|post| post.related_one("parent").and_then(|p| p.key().as_i64()))
        .collect();
    assert_eq!(parents, vec![None, Some(10), Some(10), Some(11)]);
}

#[tokio::test]
async fn test_belongs_to_many_hydrates_pivot_records() {
    let (ctx, executor) = blog_context();
    let users = ctx.query("User").unwrap().with("roles").get().await.unwrap();

    let ana = users.find(1).unwrap();
    let roles = ana.related_many("roles").unwrap();
    assert_eq!(keys(roles), vec![2, 4]);

    let editor = roles.find(2).unwrap();
    let pivot = editor.pivot().unwrap();
    assert_eq!(pivot.table(), "role_user");
    assert_eq!(pivot.get("user_id"), Some(&DatabaseValue::Int64(1)));
    assert_eq!(pivot.get("level"), Some(&DatabaseValue::from("admin")));
    // Pivot columns do not leak into the related attributes
    assert!(editor.get_attribute("pivot_level").is_none());

    assert_eq!(executor.query_count(), 2);
}

#[tokio::test]
async fn test_pivot_conditions_and_column_selection() {
    let (ctx, _) = blog_context();
    let users = ctx
        .query("User")
        .unwrap()
        .with(["admin_roles", "roles:id"])
        .get()
        .await
        .unwrap();

    assert_eq!(related_keys(users.find(1).unwrap(), "admin_roles"), vec![2]);
    assert_eq!(related_keys(users.find(2).unwrap(), "admin_roles"), vec![1]);

    let role = users.find(1).unwrap().related_many("roles").unwrap().first().unwrap().clone();
    assert!(role.get_attribute("name").is_none());
    assert!(role.pivot().is_some());
}

#[tokio::test]
async fn test_has_many_through_skips_trashed_intermediate_rows() {
    let (ctx, _) = blog_context();
    let users = ctx.query("User").unwrap().with("comments").get().await.unwrap();

    assert_eq!(related_keys(users.find(1).unwrap(), "comments"), vec![100, 101]);
    assert_eq!(related_keys(users.find(2).unwrap(), "comments"), vec![102]);
    assert!(related_keys(users.find(3).unwrap(), "comments").is_empty());
}

#[tokio::test]
async fn test_through_relations_from_countries() {
    let (ctx, _) = blog_context();
    let countries = ctx
        .query("Country")
        .unwrap()
        .with(["posts", "profile"])
        .get()
        .await
        .unwrap();

    assert_eq!(related_keys(countries.find(1).unwrap(), "posts"), vec![10, 11, 12]);
    assert_eq!(related_keys(countries.find(2).unwrap(), "posts"), vec![14]);
    assert!(related_keys(countries.find(3).unwrap(), "posts").is_empty());

    let profile = countries.find(1).unwrap().related_one("profile").unwrap();
    assert_eq!(profile.key(), DatabaseValue::Int64(1));
    let fallback = countries.find(3).unwrap().related_one("profile").unwrap();
    assert_eq!(fallback.attribute("bio"), DatabaseValue::from("unknown"));
}

#[tokio::test]
async fn test_constrained_eager_load() {
    let (ctx, _) = blog_context();
    let users = ctx
        .query("User")
        .unwrap()
        .with_constraint("posts", |query| query.where_eq("posts.title", "Hello"))
        .get()
        .await
        .unwrap();

    assert_eq!(related_keys(users.find(1).unwrap(), "posts"), vec![10]);
    assert!(related_keys(users.find(2).unwrap(), "posts").is_empty());
}

#[tokio::test]
async fn test_unknown_relation_fails_before_any_relation_query() {
    let (ctx, executor) = blog_context();
    executor.reset_query_log();

    let result = ctx.query("User").unwrap().with(["posts", "followers"]).get().await;
    match result {
        Err(ModelError::RelationNotFound { model, relation }) => {
            assert_eq!(model, "User");
            assert_eq!(relation, "followers");
        }
        other => panic!("expected RelationNotFound, got {:?}", other.map(|c| c.len())),
    }
    // Only the parent query ran
    assert_eq!(executor.query_count(), 1);
}

#[tokio::test]
async fn test_sequential_loading_matches_concurrent() {
    let (ctx, executor) = blog_context_with(OrmConfig::default().with_concurrent_eager_loading(false));
    executor.reset_query_log();

    let users = ctx.query("User").unwrap().with(["posts", "roles"]).get().await.unwrap();
    assert_eq!(executor.query_count(), 3);
    assert_eq!(related_keys(users.find(1).unwrap(), "posts"), vec![10, 11]);
    assert_eq!(related_keys(users.find(1).unwrap(), "roles"), vec![2, 4]);
}

#[tokio::test]
async fn test_collection_and_model_load() {
    let (ctx, executor) = blog_context();
    let mut users = ctx.query("User").unwrap().get().await.unwrap();

    executor.reset_query_log();
    users.load(&ctx, "posts").await.unwrap();
    assert_eq!(executor.query_count(), 1);
    assert_eq!(related_keys(users.find(2).unwrap(), "posts"), vec![12]);

    let mut post = ctx.query("Post").unwrap().find(11).await.unwrap().unwrap();
    ctx.load(&mut post, ["author", "comments"]).await.unwrap();
    assert_eq!(post.related_one("author").unwrap().key(), DatabaseValue::Int64(1));
    assert!(matches!(post.get_relation("comments"), Some(RelationValue::Many(c)) if c.is_empty()));
}

#[tokio::test]
async fn test_loaded_relations_serialize_nested() {
    let (ctx, _) = blog_context();
    let user = ctx
        .query("User")
        .unwrap()
        .with("posts")
        .find(2)
        .await
        .unwrap()
        .unwrap();

    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("password").is_none());
    assert_eq!(json["posts"][0]["id"], serde_json::json!(12));
}
