//! In-memory forest of folders and playlists.
//!
//! The tree is built from [`LibraryDatabase::list_collections`] and answers
//! the navigation questions the front end asks: roots, children, depth-first
//! descendants. It also owns the sidebar ordering (by last update, last play
//! or name) and the name filter, which flattens the forest into a list.
//!
//! [`LibraryDatabase::list_collections`]: crate::library::LibraryDatabase::list_collections

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::Write as _,
};

use {
    chrono::{DateTime, Utc},
    regex::{Regex, RegexBuilder, escape},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::domain::LibraryError,
    library::models::{Collection, SortOrder},
};

/// What the collection tree is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeSortRole {
    /// Most recently changed.
    Updated,
    /// Most recently played; never-played collections count as newest.
    Played,
    /// By name, case-insensitive.
    #[default]
    Alphabetical,
}

impl TreeSortRole {
    /// Order applied when the role is first selected.
    #[must_use]
    pub const fn default_order(self) -> SortOrder {
        match self {
            Self::Updated | Self::Played => SortOrder::Descending,
            Self::Alphabetical => SortOrder::Ascending,
        }
    }

    /// Sort state after the user picks `requested` while `current` is active.
    ///
    /// Picking the active role again flips the order. Any other role starts
    /// with its default order.
    #[must_use]
    pub fn next_sort(current: (Self, SortOrder), requested: Self) -> (Self, SortOrder) {
        let (role, order) = current;
        if role == requested {
            (role, order.reversed())
        } else {
            (requested, requested.default_order())
        }
    }

    fn compare(self, a: &Collection, b: &Collection) -> Ordering {
        match self {
            Self::Updated => a.last_updated.cmp(&b.last_updated),
            Self::Played => played_key(a).cmp(&played_key(b)),
            Self::Alphabetical => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name)),
        }
    }
}

fn played_key(collection: &Collection) -> DateTime<Utc> {
    collection.last_played.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Result of [`CollectionTree::filter`].
#[derive(Debug, PartialEq)]
pub enum TreeView<'a> {
    /// No filter: show the nested forest.
    Nested,
    /// Matching collections, flattened and sorted.
    Flat(Vec<&'a Collection>),
}

/// Forest of collections keyed by ID.
#[derive(Debug, Clone)]
pub struct CollectionTree {
    nodes: HashMap<i64, Collection>,
    /// Child IDs per parent; `None` holds the roots.
    children: HashMap<Option<i64>, Vec<i64>>,
    /// `None` until sorted: siblings in ID order.
    sort: Option<(TreeSortRole, SortOrder)>,
}

impl CollectionTree {
    /// Builds the forest. Siblings start out in ID order; a collection
    /// whose parent is missing is treated as a root.
    #[must_use]
    pub fn build(collections: Vec<Collection>) -> Self {
        let nodes: HashMap<i64, Collection> = collections
            .into_iter()
            .map(|c| (c.collection_id, c))
            .collect();

        let mut children: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
        for collection in nodes.values() {
            let parent = collection
                .parent_collection_id
                .filter(|id| nodes.contains_key(id));
            children.entry(parent).or_default().push(collection.collection_id);
        }
        for siblings in children.values_mut() {
            siblings.sort_unstable();
        }

        Self {
            nodes,
            children,
            sort: None,
        }
    }

    #[must_use]
    pub fn get(&self, collection_id: i64) -> Option<&Collection> {
        self.nodes.get(&collection_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current sort role and order, `None` for ID order.
    #[must_use]
    pub fn sort_state(&self) -> Option<(TreeSortRole, SortOrder)> {
        self.sort
    }

    #[must_use]
    pub fn roots(&self) -> Vec<&Collection> {
        self.lookup(self.children.get(&None))
    }

    #[must_use]
    pub fn children(&self, collection_id: i64) -> Vec<&Collection> {
        self.lookup(self.children.get(&Some(collection_id)))
    }

    /// Everything below `collection_id`, depth first, in sibling order.
    #[must_use]
    pub fn descendants(&self, collection_id: i64) -> Vec<&Collection> {
        let mut out = Vec::new();
        self.collect_descendants(Some(collection_id), &mut out);
        out
    }

    /// Every collection, depth first from the roots.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Collection> {
        let mut out = Vec::new();
        self.collect_descendants(None, &mut out);
        out
    }

    /// All folders, depth first. These are the valid move targets.
    #[must_use]
    pub fn folders(&self) -> Vec<&Collection> {
        self.flatten().into_iter().filter(|c| c.is_folder()).collect()
    }

    /// Reorders every sibling list. Ties keep ID order.
    pub fn sort(&mut self, role: TreeSortRole, order: SortOrder) {
        self.sort = Some((role, order));
        let nodes = &self.nodes;
        for siblings in self.children.values_mut() {
            siblings.sort_by(|a, b| match (nodes.get(a), nodes.get(b)) {
                (Some(a), Some(b)) => compare(role, order, a, b),
                _ => a.cmp(b),
            });
        }
    }

    /// Applies [`TreeSortRole::next_sort`] and returns the new state.
    pub fn select_sort_role(&mut self, role: TreeSortRole) -> (TreeSortRole, SortOrder) {
        let (role, order) = match self.sort {
            Some(current) => TreeSortRole::next_sort(current, role),
            None => (role, role.default_order()),
        };
        self.sort(role, order);
        (role, order)
    }

    /// Filters collections by name.
    ///
    /// An empty (or blank) text returns [`TreeView::Nested`]. Otherwise the
    /// result holds every collection with a word in its name starting with
    /// `text`, case-insensitive, sorted like the tree.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::InvalidData` if the text produces an
    /// oversized pattern.
    pub fn filter(&self, text: &str) -> Result<TreeView<'_>, LibraryError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TreeView::Nested);
        }

        let pattern = word_prefix_pattern(text)?;
        let mut matches: Vec<&Collection> = self
            .flatten()
            .into_iter()
            .filter(|c| pattern.is_match(&c.name))
            .collect();
        match self.sort {
            Some((role, order)) => matches.sort_by(|a, b| compare(role, order, a, b)),
            None => matches.sort_by_key(|c| c.collection_id),
        }

        Ok(TreeView::Flat(matches))
    }

    /// Renders a view as indented text, one collection per line.
    #[must_use]
    pub fn render(&self, view: &TreeView<'_>) -> String {
        let mut out = String::new();
        match view {
            TreeView::Nested => self.render_level(None, 0, &mut out),
            TreeView::Flat(matches) => {
                for collection in matches {
                    render_line(collection, 0, &mut out);
                }
            }
        }
        out
    }

    fn render_level(&self, parent: Option<i64>, depth: usize, out: &mut String) {
        for collection in self.lookup(self.children.get(&parent)) {
            render_line(collection, depth, out);
            self.render_level(Some(collection.collection_id), depth + 1, out);
        }
    }

    fn collect_descendants<'a>(&'a self, parent: Option<i64>, out: &mut Vec<&'a Collection>) {
        for collection in self.lookup(self.children.get(&parent)) {
            out.push(collection);
            self.collect_descendants(Some(collection.collection_id), out);
        }
    }

    fn lookup(&self, ids: Option<&Vec<i64>>) -> Vec<&Collection> {
        ids.map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }
}

fn compare(role: TreeSortRole, order: SortOrder, a: &Collection, b: &Collection) -> Ordering {
    let ordering = role.compare(a, b);
    let ordering = match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    };
    ordering.then_with(|| a.collection_id.cmp(&b.collection_id))
}

/// `\b<text>\w*`, case-insensitive, with `text` taken literally.
fn word_prefix_pattern(text: &str) -> Result<Regex, LibraryError> {
    RegexBuilder::new(&format!(r"\b{}\w*", escape(text)))
        .case_insensitive(true)
        .build()
        .map_err(|e| LibraryError::InvalidData {
            reason: format!("invalid filter '{text}': {e}"),
        })
}

fn render_line(collection: &Collection, depth: usize, out: &mut String) {
    let marker = if collection.is_folder() { "+" } else { "-" };
    let lock = if collection.protected { " [protected]" } else { "" };
    let _ = writeln!(
        out,
        "{}{marker} {} (#{}){lock}",
        "  ".repeat(depth),
        collection.name,
        collection.collection_id
    );
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::library::{
        collection_tree::{CollectionTree, TreeSortRole, TreeView},
        models::{Collection, CollectionKind, SortOrder},
    };

    fn collection(id: i64, kind: CollectionKind, name: &str, parent: Option<i64>) -> Collection {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Collection {
            collection_id: id,
            kind,
            parent_collection_id: parent,
            name: name.to_string(),
            created: at,
            last_updated: at + chrono::Duration::minutes(id),
            last_played: None,
            thumbnail: None,
            protected: false,
        }
    }

    fn sample_tree() -> CollectionTree {
        CollectionTree::build(vec![
            collection(1, CollectionKind::Folder, "Rock", None),
            collection(2, CollectionKind::Playlist, "classic rock", Some(1)),
            collection(3, CollectionKind::Folder, "Jazz", None),
            collection(4, CollectionKind::Playlist, "Bebop", Some(3)),
            collection(5, CollectionKind::Playlist, "Rockabilly", Some(1)),
            collection(6, CollectionKind::Playlist, "Orphan", Some(99)),
        ])
    }

    fn ids(collections: &[&Collection]) -> Vec<i64> {
        collections.iter().map(|c| c.collection_id).collect()
    }

    #[test]
    fn test_build_roots_and_descendants() {
        let tree = sample_tree();
        assert_eq!(ids(&tree.roots()), vec![1, 3, 6]);
        assert_eq!(ids(&tree.children(1)), vec![2, 5]);
        assert_eq!(ids(&tree.descendants(3)), vec![4]);
        assert_eq!(ids(&tree.flatten()), vec![1, 2, 5, 3, 4, 6]);
        assert_eq!(ids(&tree.folders()), vec![1, 3]);
    }

    #[test]
    fn test_next_sort_toggles_same_role() {
        let current = (TreeSortRole::Alphabetical, SortOrder::Ascending);
        assert_eq!(
            TreeSortRole::next_sort(current, TreeSortRole::Alphabetical),
            (TreeSortRole::Alphabetical, SortOrder::Descending)
        );
        assert_eq!(
            TreeSortRole::next_sort(current, TreeSortRole::Updated),
            (TreeSortRole::Updated, SortOrder::Descending)
        );
        assert_eq!(
            TreeSortRole::next_sort(
                (TreeSortRole::Updated, SortOrder::Ascending),
                TreeSortRole::Alphabetical
            ),
            (TreeSortRole::Alphabetical, SortOrder::Ascending)
        );
    }

    #[test]
    fn test_sort_alphabetical_and_updated() {
        let mut tree = sample_tree();
        tree.sort(TreeSortRole::Alphabetical, SortOrder::Ascending);
        assert_eq!(ids(&tree.roots()), vec![3, 6, 1]);
        assert_eq!(ids(&tree.children(1)), vec![2, 5]);

        let state = tree.select_sort_role(TreeSortRole::Updated);
        assert_eq!(state, (TreeSortRole::Updated, SortOrder::Descending));
        assert_eq!(ids(&tree.roots()), vec![6, 3, 1]);
    }

    #[test]
    fn test_never_played_sorts_as_newest() {
        let mut played = collection(1, CollectionKind::Playlist, "Played", None);
        played.last_played = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let never = collection(2, CollectionKind::Playlist, "Never", None);

        let mut tree = CollectionTree::build(vec![played, never]);
        tree.sort(TreeSortRole::Played, SortOrder::Descending);
        assert_eq!(ids(&tree.roots()), vec![2, 1]);
    }

    #[test]
    fn test_filter_matches_word_prefixes() {
        let mut tree = sample_tree();
        tree.sort(TreeSortRole::Alphabetical, SortOrder::Ascending);
        assert_eq!(tree.filter("").unwrap(), TreeView::Nested);
        assert_eq!(tree.filter("   ").unwrap(), TreeView::Nested);

        match tree.filter("rock").unwrap() {
            TreeView::Flat(matches) => assert_eq!(ids(&matches), vec![2, 1, 5]),
            TreeView::Nested => panic!("expected flat view"),
        }
        match tree.filter("ock").unwrap() {
            TreeView::Flat(matches) => assert!(matches.is_empty()),
            TreeView::Nested => panic!("expected flat view"),
        }
        // Regex metacharacters are literal.
        match tree.filter("(").unwrap() {
            TreeView::Flat(matches) => assert!(matches.is_empty()),
            TreeView::Nested => panic!("expected flat view"),
        }
    }

    #[test]
    fn test_render_nested() {
        let tree = CollectionTree::build(vec![
            collection(1, CollectionKind::Folder, "Rock", None),
            collection(2, CollectionKind::Playlist, "Mix", Some(1)),
        ]);
        assert_eq!(
            tree.render(&TreeView::Nested),
            "+ Rock (#1)\n  - Mix (#2)\n"
        );
    }
}
