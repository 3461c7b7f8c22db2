// src/metadata/taxonomy.rs

//! Breadcrumb index of a taxonomy
//!
//! A term's breadcrumb is the `|`-joined names from the first level below
//! the taxonomy root down to the term itself (`Europe|France|Paris`). The
//! index maps each breadcrumb to the leaf term id and to the full id path.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::schema::Term;

/// Separator between names in a breadcrumb
pub const PATH_SEPARATOR: &str = "|";

/// Separator between several breadcrumbs in one flat value
pub const MULTI_PATH_SEPARATOR: &str = "||";

/// Resolved position of a breadcrumb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPath {
    /// Id of the term the breadcrumb ends at
    pub leaf: String,
    /// Ids from the first level below the root down to `leaf`
    pub path: Vec<String>,
}

/// Which ids a resolved breadcrumb contributes to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermMode {
    /// Only the leaf term id
    #[default]
    Leaf,
    /// Every term id along the path
    Path,
}

/// Breadcrumb → term index for one taxonomy root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermPathIndex {
    root_id: String,
    entries: BTreeMap<String, TermPath>,
}

impl TermPathIndex {
    /// Build an index from the nodes of a taxonomy walk
    ///
    /// `path_ids` of each node start at the taxonomy root, which is not
    /// part of any breadcrumb. Ancestors missing from `nodes` contribute an
    /// empty name.
    pub fn from_terms(root_id: impl Into<String>, nodes: &[Term]) -> Self {
        let name_for_id: HashMap<&str, &str> = nodes
            .iter()
            .map(|n| (n.id.as_str(), n.name.as_str()))
            .collect();

        let mut entries = BTreeMap::new();
        for node in nodes {
            let mut path: Vec<String> = node.path_ids.iter().skip(1).cloned().collect();
            path.push(node.id.clone());
            let breadcrumb = path
                .iter()
                .map(|id| name_for_id.get(id.as_str()).copied().unwrap_or(""))
                .collect::<Vec<_>>()
                .join(PATH_SEPARATOR);
            entries.insert(
                breadcrumb,
                TermPath {
                    leaf: node.id.clone(),
                    path,
                },
            );
        }

        Self {
            root_id: root_id.into(),
            entries,
        }
    }

    /// Taxonomy root this index belongs to
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a breadcrumb
    pub fn get(&self, breadcrumb: &str) -> Option<&TermPath> {
        self.entries.get(breadcrumb)
    }

    /// Leaf term id of a breadcrumb
    pub fn resolve_leaf(&self, breadcrumb: &str) -> Option<&str> {
        self.get(breadcrumb).map(|e| e.leaf.as_str())
    }

    /// Full id path of a breadcrumb
    pub fn resolve_path(&self, breadcrumb: &str) -> Option<&[String]> {
        self.get(breadcrumb).map(|e| e.path.as_slice())
    }

    /// Ids contributed by a breadcrumb in the given mode
    pub fn resolve(&self, breadcrumb: &str, mode: TermMode) -> Vec<String> {
        match (self.get(breadcrumb), mode) {
            (Some(e), TermMode::Leaf) => vec![e.leaf.clone()],
            (Some(e), TermMode::Path) => e.path.clone(),
            (None, _) => Vec::new(),
        }
    }

    /// Every breadcrumb, sorted
    pub fn breadcrumbs(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Breadcrumbs whose leaf is not the taxonomy root itself
    pub fn selectable_breadcrumbs(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.leaf != self.root_id)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Breadcrumb ending at `term_id`, if indexed
    pub fn breadcrumb_for(&self, term_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e.leaf == term_id)
            .map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(id: &str, name: &str, path_ids: &[&str]) -> Term {
        Term {
            id: id.to_string(),
            name: name.to_string(),
            path_ids: path_ids.iter().map(|s| s.to_string()).collect(),
            taxonomy_id: Some("taxonomy:1".to_string()),
            depth: Some(path_ids.len() as u32),
        }
    }

    fn geography() -> TermPathIndex {
        TermPathIndex::from_terms(
            "term:root",
            &[
                term("term:eu", "Europe", &["term:root"]),
                term("term:fr", "France", &["term:root", "term:eu"]),
                term("term:paris", "Paris", &["term:root", "term:eu", "term:fr"]),
                term("term:na", "North America", &["term:root"]),
            ],
        )
    }

    #[test]
    fn test_breadcrumbs_exclude_root() {
        let index = geography();
        assert_eq!(index.len(), 4);
        assert_eq!(index.resolve_leaf("Europe|France|Paris"), Some("term:paris"));
        assert_eq!(
            index.resolve_path("Europe|France|Paris").unwrap(),
            &["term:eu".to_string(), "term:fr".to_string(), "term:paris".to_string()]
        );
        assert!(index.get("Root|Europe").is_none());
    }

    #[test]
    fn test_round_trip() {
        let index = geography();
        for id in ["term:eu", "term:fr", "term:paris", "term:na"] {
            let crumb = index.breadcrumb_for(id).unwrap().to_string();
            assert_eq!(index.resolve_leaf(&crumb), Some(id));
        }
    }

    #[test]
    fn test_resolve_modes() {
        let index = geography();
        assert_eq!(index.resolve("Europe|France", TermMode::Leaf), vec!["term:fr"]);
        assert_eq!(
            index.resolve("Europe|France", TermMode::Path),
            vec!["term:eu", "term:fr"]
        );
        assert!(index.resolve("Atlantis", TermMode::Leaf).is_empty());
    }

    #[test]
    fn test_missing_ancestor_has_blank_name() {
        let index = TermPathIndex::from_terms(
            "term:root",
            &[term("term:x", "Leaf", &["term:root", "term:gone"])],
        );
        assert_eq!(index.resolve_leaf("|Leaf"), Some("term:x"));
    }

    #[test]
    fn test_selectable_excludes_root_leaf() {
        let index = TermPathIndex::from_terms(
            "term:root",
            &[
                term("term:root", "Root", &[]),
                term("term:a", "A", &["term:root"]),
            ],
        );
        assert_eq!(index.selectable_breadcrumbs(), vec!["A"]);
    }
}
