use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Index;

/// Read routes of the live files, owned by the database
#[derive(Debug, Default)]
pub struct RouteRegistry {
    by_path: BTreeMap<String, Index>,
    by_index: HashMap<Index, String>,
}

/// Route path derived from a file title
///
/// Characters other than ASCII letters, digits, `.`, `-` and `_` become `_`.
pub fn route_path(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("/{}", slug)
}

impl RouteRegistry {
    pub fn new() -> Self {
        RouteRegistry::default()
    }

    /// Register the route of file `index`, returning its path
    ///
    /// A title whose path is taken gets an index-suffixed variant; if that
    /// is taken too the registration is refused.
    pub fn register(&mut self, title: &str, index: Index) -> Result<String> {
        if let Some(existing) = self.by_index.get(&index) {
            return Err(Error::DuplicateRoute(existing.clone()));
        }

        let mut path = route_path(title);
        if self.by_path.contains_key(&path) {
            let suffixed = route_path(&format!("{}_{}", title, index));
            debug!("Route {} is taken, trying {}", path, suffixed);
            path = suffixed;
        }
        if self.by_path.contains_key(&path) {
            warn!("Refusing to register duplicate route {} for file {}", path, index);
            return Err(Error::DuplicateRoute(path));
        }

        self.by_path.insert(path.clone(), index);
        self.by_index.insert(index, path.clone());
        Ok(path)
    }

    /// Drop the route of file `index`
    pub fn remove_index(&mut self, index: Index) -> Option<String> {
        let path = self.by_index.remove(&index)?;
        self.by_path.remove(&path);
        Some(path)
    }

    /// File served under `path`
    pub fn resolve(&self, path: &str) -> Option<Index> {
        self.by_path.get(path).copied()
    }

    pub fn path_of(&self, index: Index) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    /// Registered paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_path_slug() {
        assert_eq!(route_path("cat pic.png"), "/cat_pic.png");
        assert_eq!(route_path("a/b?c"), "/a_b_c");
    }

    #[test]
    fn test_duplicate_title_gets_suffix() {
        let mut routes = RouteRegistry::new();
        assert_eq!(routes.register("doc", 1).unwrap(), "/doc");
        assert_eq!(routes.register("doc", 2).unwrap(), "/doc_2");
        assert_eq!(routes.resolve("/doc_2"), Some(2));
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut routes = RouteRegistry::new();
        routes.register("doc", 1).unwrap();
        routes.register("doc_2", 5).unwrap();
        // "doc" -> "/doc" taken, "/doc_2" taken as well
        assert!(matches!(
            routes.register("doc", 2),
            Err(Error::DuplicateRoute(path)) if path == "/doc_2"
        ));
        assert_eq!(routes.resolve("/doc_2"), Some(5));
    }

    #[test]
    fn test_remove_index_frees_path() {
        let mut routes = RouteRegistry::new();
        routes.register("doc", 1).unwrap();
        assert_eq!(routes.remove_index(1).as_deref(), Some("/doc"));
        assert!(routes.resolve("/doc").is_none());
        assert!(routes.is_empty());
    }
}
