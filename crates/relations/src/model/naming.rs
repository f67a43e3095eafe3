//! Naming conventions for tables and keys derived from model names

/// `PostComment` -> `post_comment`
pub fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;

    for c in name.chars() {
        if c.is_uppercase() {
            if previous_lower {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            previous_lower = false;
        } else if c == '-' || c == ' ' {
            result.push('_');
            previous_lower = false;
        } else {
            result.push(c);
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

/// Simple pluralization (English-centric)
pub fn pluralize(name: &str) -> String {
    let vowel_y = ["ay", "ey", "iy", "oy", "uy"];
    if name.ends_with('y') && !vowel_y.iter().any(|suffix| name.ends_with(suffix)) {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s') || name.ends_with("sh") || name.ends_with("ch") || name.ends_with('x') || name.ends_with('z') {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

/// Default table for a model: plural snake case (`PostComment` -> `post_comments`)
pub fn table_name(model_name: &str) -> String {
    pluralize(&snake_case(model_name))
}

/// Default foreign key pointing at a model: `User` with key `id` -> `user_id`
pub fn foreign_key(model_name: &str, primary_key: &str) -> String {
    format!("{}_{}", snake_case(model_name), primary_key)
}

/// Default pivot table joining two models: sorted snake names joined by `_`
pub fn pivot_table(first: &str, second: &str) -> String {
    let mut segments = [snake_case(first), snake_case(second)];
    segments.sort();
    segments.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(table_name("User"), "users");
        assert_eq!(table_name("PostComment"), "post_comments");
        assert_eq!(table_name("Category"), "categories");
        assert_eq!(table_name("Key"), "keys");
        assert_eq!(table_name("Address"), "addresses");
    }

    #[test]
    fn test_keys_and_pivot_tables() {
        assert_eq!(foreign_key("User", "id"), "user_id");
        assert_eq!(foreign_key("BlogPost", "uuid"), "blog_post_uuid");
        assert_eq!(pivot_table("User", "Role"), "role_user");
        assert_eq!(pivot_table("Role", "User"), "role_user");
    }
}
