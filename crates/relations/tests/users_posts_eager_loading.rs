use std::sync::Arc;

use elif_relations::{
    row_from_json, DatabaseValue, MemoryExecutor, ModelDefinition, ModelRegistry, OrmContext, Row,
};
use serde_json::json;

fn rows(value: serde_json::Value) -> Vec<Row> {
    match value {
        serde_json::Value::Array(rows) => rows.into_iter().map(row_from_json).collect(),
        _ => Vec::new(),
    }
}

fn setup() -> (OrmContext, Arc<MemoryExecutor>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let executor = Arc::new(MemoryExecutor::new());
    executor.seed("users", rows(json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}])));
    executor.seed(
        "posts",
        rows(json!([
            {"id": 10, "user_id": 1},
            {"id": 11, "user_id": 1},
            {"id": 12, "user_id": 2}
        ])),
    );

    let registry = ModelRegistry::builder()
        .register(ModelDefinition::builder("User").has_many("posts", "Post").build().unwrap())
        .register(ModelDefinition::builder("Post").belongs_to("user", "User").build().unwrap())
        .build()
        .unwrap();

    (OrmContext::new(Arc::new(registry), executor.clone()), executor)
}

fn post_ids(user: &elif_relations::Model) -> Vec<DatabaseValue> {
    user.related_many("posts").map(|posts| posts.model_keys()).unwrap_or_default()
}

#[tokio::test]
async fn test_users_with_posts_in_two_queries() {
    let (ctx, executor) = setup();

    let users = ctx.query("User").unwrap().with("posts").get().await.unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(executor.query_count(), 2);

    let first = users.find(1).unwrap();
    assert_eq!(post_ids(first), vec![DatabaseValue::Int64(10), DatabaseValue::Int64(11)]);
    let second = users.find(2).unwrap();
    assert_eq!(post_ids(second), vec![DatabaseValue::Int64(12)]);
}

#[tokio::test]
async fn test_posts_with_their_user() {
    let (ctx, executor) = setup();

    let posts = ctx.query("Post").unwrap().with("user").get().await.unwrap();

    assert_eq!(executor.query_count(), 2);
    let owners: Vec<DatabaseValue> = posts
        .iter()
        .map(|post| post.related_one("user").map(|user| user.key()).unwrap_or(DatabaseValue::Null))
        .collect();
    assert_eq!(
        owners,
        vec![DatabaseValue::Int64(1), DatabaseValue::Int64(1), DatabaseValue::Int64(2)]
    );
}
