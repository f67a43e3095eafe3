//! Eager load specifications
//!
//! A spec maps dotted relation paths to optional constraints on the relation
//! query. Adding `a.b.c` also adds `a` and `a.b`, unconstrained.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::query::ModelQuery;

/// Constraint applied to a relation query before it is fetched
pub type Constraint = Arc<dyn Fn(ModelQuery) -> ModelQuery + Send + Sync>;

#[derive(Clone)]
struct Entry {
    constraint: Option<Constraint>,
    /// Requested by the caller rather than implied by a longer path
    explicit: bool,
}

/// Relation paths to eager load
#[derive(Clone, Default)]
pub struct EagerLoadSpec {
    entries: BTreeMap<String, Entry>,
}

impl EagerLoadSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `"relation"`, `"a.b.c"` or `"relation:col1,col2"`
    pub fn with(mut self, relation: &str) -> Self {
        self.add_path(relation);
        self
    }

    /// Add a path with a constraint on its relation query
    pub fn with_constraint<F>(mut self, path: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.add(path.trim(), Some(Arc::new(constraint)));
        self
    }

    /// Remove a path and everything nested under it
    pub fn without(mut self, path: &str) -> Self {
        let prefix = format!("{}.", path);
        self.entries.retain(|name, _| name != path && !name.starts_with(&prefix));
        self
    }

    /// Merge another spec into this one; explicit entries of `other` replace ours
    pub fn merge(mut self, other: EagerLoadSpec) -> Self {
        for (path, entry) in other.entries {
            self.insert(path, entry);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// All paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn constraint(&self, path: &str) -> Option<&Constraint> {
        self.entries.get(path).and_then(|entry| entry.constraint.as_ref())
    }

    /// Paths without a dot, with their constraints
    pub fn top_level(&self) -> Vec<(String, Option<Constraint>)> {
        self.entries
            .iter()
            .filter(|(path, _)| !path.contains('.'))
            .map(|(path, entry)| (path.clone(), entry.constraint.clone()))
            .collect()
    }

    /// Paths below `relation`, with the `relation.` prefix removed
    pub fn nested_under(&self, relation: &str) -> EagerLoadSpec {
        let prefix = format!("{}.", relation);
        EagerLoadSpec {
            entries: self
                .entries
                .iter()
                .filter_map(|(path, entry)| {
                    path.strip_prefix(&prefix)
                        .map(|rest| (rest.to_string(), entry.clone()))
                })
                .collect(),
        }
    }

    fn add_path(&mut self, relation: &str) {
        let relation = relation.trim();
        match relation.split_once(':') {
            Some((path, columns)) => {
                let columns: Vec<String> = columns
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect();
                let constraint: Constraint = Arc::new(move |query: ModelQuery| {
                    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                    query.select_qualified(&columns)
                });
                self.add(path.trim(), Some(constraint));
            }
            None => self.add(relation, None),
        }
    }

    fn add(&mut self, path: &str, constraint: Option<Constraint>) {
        if path.is_empty() {
            return;
        }

        let segments: Vec<&str> = path.split('.').collect();
        for depth in 1..segments.len() {
            let prefix = segments[..depth].join(".");
            self.insert(
                prefix,
                Entry {
                    constraint: None,
                    explicit: false,
                },
            );
        }
        self.insert(
            path.to_string(),
            Entry {
                constraint,
                explicit: true,
            },
        );
    }

    /// Implied entries never replace an existing one; explicit entries always do
    fn insert(&mut self, path: String, entry: Entry) {
        if entry.explicit || !self.entries.contains_key(&path) {
            self.entries.insert(path, entry);
        }
    }
}

impl fmt::Debug for EagerLoadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(path, entry)| {
                if entry.constraint.is_some() {
                    format!("{} (constrained)", path)
                } else {
                    path.clone()
                }
            }))
            .finish()
    }
}

impl From<&str> for EagerLoadSpec {
    fn from(relation: &str) -> Self {
        EagerLoadSpec::new().with(relation)
    }
}

impl From<String> for EagerLoadSpec {
    fn from(relation: String) -> Self {
        EagerLoadSpec::new().with(&relation)
    }
}

impl From<&[&str]> for EagerLoadSpec {
    fn from(relations: &[&str]) -> Self {
        relations.iter().fold(EagerLoadSpec::new(), |spec, r| spec.with(r))
    }
}

impl<const N: usize> From<[&str; N]> for EagerLoadSpec {
    fn from(relations: [&str; N]) -> Self {
        EagerLoadSpec::from(&relations[..])
    }
}

impl From<Vec<&str>> for EagerLoadSpec {
    fn from(relations: Vec<&str>) -> Self {
        EagerLoadSpec::from(relations.as_slice())
    }
}

impl From<Vec<String>> for EagerLoadSpec {
    fn from(relations: Vec<String>) -> Self {
        relations.iter().fold(EagerLoadSpec::new(), |spec, r| spec.with(r))
    }
}
