//! ORM configuration

/// Engine-wide settings shared by every model type in a registry
#[derive(Debug, Clone)]
pub struct OrmConfig {
    /// Page size used by `paginate` when the model declares none
    pub per_page: i64,
    /// Relation slot pivot records are stored under unless a relation overrides it
    pub pivot_accessor: String,
    /// Fetch the top-level paths of one eager-load pass concurrently
    pub concurrent_eager_loading: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            per_page: 15,
            pivot_accessor: "pivot".to_string(),
            concurrent_eager_loading: true,
        }
    }
}

impl OrmConfig {
    pub fn with_per_page(mut self, per_page: i64) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_pivot_accessor(mut self, accessor: &str) -> Self {
        self.pivot_accessor = accessor.to_string();
        self
    }

    pub fn with_concurrent_eager_loading(mut self, enabled: bool) -> Self {
        self.concurrent_eager_loading = enabled;
        self
    }
}
