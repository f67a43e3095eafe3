//! Shared fixtures: a small blog schema on the in-memory executor

use std::sync::Arc;

use serde_json::json;

use crate::backends::{row_from_json, DatabaseValue, MemoryExecutor, Row};
use crate::config::OrmConfig;
use crate::context::OrmContext;
use crate::model::{ModelDefinition, ModelRegistry};
use crate::relationships::RelationSpec;

pub(crate) fn rows(value: serde_json::Value) -> Vec<Row> {
    match value {
        serde_json::Value::Array(rows) => rows.into_iter().map(row_from_json).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn blog_registry(config: OrmConfig) -> ModelRegistry {
    let user = ModelDefinition::builder("User")
        .has_many("posts", "Post")
        .relation(RelationSpec::has_one("profile", "Profile").with_default(row_from_json(json!({"bio": "none"}))))
        .relation(RelationSpec::belongs_to_many("roles", "Role").with_pivot(&["level"]))
        .relation(
            RelationSpec::belongs_to_many("admin_roles", "Role")
                .where_pivot("level", "admin")
                .order_by_pivot("role_id", crate::query::OrderDirection::Asc),
        )
        .relation(RelationSpec::has_many_through("comments", "Comment", "Post"))
        .belongs_to("country", "Country")
        .hidden(&["password"])
        .build()
        .unwrap();

    let post = ModelDefinition::builder("Post")
        .relation(RelationSpec::belongs_to("author", "User").foreign_key("user_id"))
        .has_many("comments", "Comment")
        .relation(RelationSpec::belongs_to("parent", "Post"))
        .relation(RelationSpec::has_many("children", "Post").foreign_key("parent_id"))
        .soft_deletes()
        .local_scope("titled", |query, args| {
            let title = args.first().cloned().unwrap_or(DatabaseValue::Null);
            let column = query.qualify("title");
            Ok(query.where_eq(&column, title))
        })
        .build()
        .unwrap();

    let country = ModelDefinition::builder("Country")
        .has_many("users", "User")
        .relation(RelationSpec::has_many_through("posts", "Post", "User"))
        .relation(
            RelationSpec::has_one_through("profile", "Profile", "User")
                .with_default(row_from_json(json!({"bio": "unknown"}))),
        )
        .build()
        .unwrap();

    ModelRegistry::builder()
        .config(config)
        .register(user)
        .register(post)
        .register(country)
        .register(ModelDefinition::builder("Comment").belongs_to("post", "Post").build().unwrap())
        .register(ModelDefinition::builder("Role").build().unwrap())
        .register(ModelDefinition::builder("Profile").belongs_to("user", "User").build().unwrap())
        .build()
        .unwrap()
}

/// Seeded blog: three users, five posts (one trashed), comments, roles, profiles
pub(crate) fn blog_context() -> (OrmContext, Arc<MemoryExecutor>) {
    blog_context_with(OrmConfig::default())
}

pub(crate) fn blog_context_with(config: OrmConfig) -> (OrmContext, Arc<MemoryExecutor>) {
    let executor = Arc::new(MemoryExecutor::new());
    executor.seed(
        "countries",
        rows(json!([
            {"id": 1, "code": "PT"},
            {"id": 2, "code": "ES"},
            {"id": 3, "code": "FR"}
        ])),
    );
    executor.seed(
        "users",
        rows(json!([
            {"id": 1, "name": "ana", "country_id": 1, "password": "x"},
            {"id": 2, "name": "bea", "country_id": 1, "password": "y"},
            {"id": 3, "name": "cy", "country_id": 2, "password": "z"}
        ])),
    );
    executor.seed(
        "posts",
        rows(json!([
            {"id": 10, "user_id": 1, "title": "Hello", "parent_id": null, "deleted_at": null},
            {"id": 11, "user_id": 1, "title": "Again", "parent_id": 10, "deleted_at": null},
            {"id": 12, "user_id": 2, "title": "Other", "parent_id": 10, "deleted_at": null},
            {"id": 13, "user_id": 2, "title": "Gone", "parent_id": null, "deleted_at": "2024-01-01T00:00:00Z"},
            {"id": 14, "user_id": 3, "title": "Reply", "parent_id": 11, "deleted_at": null}
        ])),
    );
    executor.seed(
        "comments",
        rows(json!([
            {"id": 100, "post_id": 10, "body": "first"},
            {"id": 101, "post_id": 10, "body": "second"},
            {"id": 102, "post_id": 12, "body": "third"},
            {"id": 103, "post_id": 13, "body": "on a trashed post"}
        ])),
    );
    executor.seed(
        "roles",
        rows(json!([
            {"id": 1, "name": "admin"},
            {"id": 2, "name": "editor"},
            {"id": 3, "name": "viewer"},
            {"id": 4, "name": "guest"}
        ])),
    );
    executor.seed(
        "role_user",
        rows(json!([
            {"user_id": 1, "role_id": 2, "level": "admin"},
            {"user_id": 1, "role_id": 4, "level": "basic"},
            {"user_id": 2, "role_id": 1, "level": "admin"}
        ])),
    );
    executor.seed("profiles", rows(json!([{"id": 1, "user_id": 1, "bio": "writer"}])));

    let registry = Arc::new(blog_registry(config));
    let ctx = OrmContext::new(registry, executor.clone());
    (ctx, executor)
}
