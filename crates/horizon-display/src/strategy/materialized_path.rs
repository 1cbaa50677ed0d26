//! Nested children tree flattening.
//!
//! The collection holds top-level records; each record nests its children
//! under `children_property`. The output is the pre-order flattening of every
//! top-level subtree in collection order.
//!
//! Counting walks the raw records only. Display items for a subtree are built
//! the first time a position inside it is requested.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use horizon_display_core::logging::targets;
use horizon_display_core::{Record, RecordList};

use super::{ItemsStrategy, Sorter, StrategyKind, StrategyState, item_key};
use crate::error::{DisplayError, Result};
use crate::item::{CollectionItem, DisplayItem, NodeType};

/// Serializable options of a [`MaterializedPath`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedPathOptions {
    /// Field holding the nested child records.
    pub children_property: String,
    /// Field classifying a record as node, hidden node or leaf.
    #[serde(default)]
    pub node_property: Option<String>,
}

type Subtree<T> = Arc<Vec<DisplayItem<T>>>;

/// Flattens nested record trees.
pub struct MaterializedPath<T> {
    collection: RecordList<T>,
    options: MaterializedPathOptions,
    // Subtree size per top-level record.
    sizes: RwLock<Option<Arc<Vec<usize>>>>,
    subtrees: RwLock<Vec<Option<Subtree<T>>>>,
}

/// Builder for [`MaterializedPath`].
pub struct MaterializedPathBuilder<T> {
    collection: Option<RecordList<T>>,
    children_property: Option<String>,
    node_property: Option<String>,
}

impl<T: Record> MaterializedPathBuilder<T> {
    /// Sets the collection of top-level records.
    pub fn collection(mut self, collection: RecordList<T>) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Sets the children field.
    pub fn children_property(mut self, name: impl Into<String>) -> Self {
        self.children_property = Some(name.into());
        self
    }

    /// Sets the node classification field.
    pub fn node_property(mut self, name: impl Into<String>) -> Self {
        self.node_property = Some(name.into());
        self
    }

    /// Builds the strategy.
    pub fn build(self) -> Result<MaterializedPath<T>> {
        let collection = self
            .collection
            .ok_or(DisplayError::MissingOption("collection"))?;
        let children_property = self
            .children_property
            .ok_or(DisplayError::MissingOption("children_property"))?;
        Ok(MaterializedPath {
            collection,
            options: MaterializedPathOptions {
                children_property,
                node_property: self.node_property,
            },
            sizes: RwLock::new(None),
            subtrees: RwLock::new(Vec::new()),
        })
    }
}

impl<T: Record> MaterializedPath<T> {
    /// Creates a builder.
    pub fn builder() -> MaterializedPathBuilder<T> {
        MaterializedPathBuilder {
            collection: None,
            children_property: None,
            node_property: None,
        }
    }

    /// Restores a strategy from a snapshot.
    pub fn from_state(state: &StrategyState, collection: RecordList<T>) -> Result<Self> {
        state.expect_kind(StrategyKind::MaterializedPath)?;
        let options: MaterializedPathOptions = state.options()?;
        let mut builder = Self::builder()
            .collection(collection)
            .children_property(options.children_property);
        if let Some(node_property) = options.node_property {
            builder = builder.node_property(node_property);
        }
        builder.build()
    }

    /// Returns the options.
    pub fn tree_options(&self) -> &MaterializedPathOptions {
        &self.options
    }

    /// Returns a sorter that keeps every subtree directly after its node.
    ///
    /// Siblings keep the relative order they have in the incoming indices, so
    /// a content sort placed before this sorter orders each level without
    /// tearing subtrees apart. Items whose parent is not among the incoming
    /// indices are dropped.
    pub fn tree_sorter() -> Sorter<T> {
        Arc::new(|items: &[DisplayItem<T>], indices: &[usize]| {
            let position_of: HashMap<usize, usize> = items
                .iter()
                .enumerate()
                .map(|(position, item)| (item_key(item), position))
                .collect();

            let mut roots = Vec::new();
            let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
            for &index in indices {
                let parent = items[index]
                    .parent()
                    .and_then(|parent| position_of.get(&item_key(&parent)).copied());
                match parent {
                    Some(parent) => children.entry(parent).or_default().push(index),
                    None => roots.push(index),
                }
            }

            let mut order = Vec::with_capacity(indices.len());
            let mut stack: Vec<usize> = roots.into_iter().rev().collect();
            while let Some(index) = stack.pop() {
                order.push(index);
                if let Some(kids) = children.remove(&index) {
                    stack.extend(kids.into_iter().rev());
                }
            }
            order
        })
    }

    fn subtree_size(&self, record: &Arc<T>) -> usize {
        let mut size = 0;
        let mut stack = vec![record.clone()];
        while let Some(record) = stack.pop() {
            size += 1;
            if let Some(children) = record.children(&self.options.children_property) {
                stack.extend(children);
            }
        }
        size
    }

    fn sizes(&self) -> Arc<Vec<usize>> {
        if let Some(sizes) = self.sizes.read().as_ref() {
            return sizes.clone();
        }
        let sizes: Arc<Vec<usize>> = Arc::new(
            self.collection
                .snapshot()
                .iter()
                .map(|record| self.subtree_size(record))
                .collect(),
        );
        *self.sizes.write() = Some(sizes.clone());
        sizes
    }

    /// Finds the top-level entry containing display position `index`.
    fn locate(&self, index: usize) -> Result<(usize, usize)> {
        let sizes = self.sizes();
        let mut offset = 0;
        for (top, &size) in sizes.iter().enumerate() {
            if index < offset + size {
                return Ok((top, index - offset));
            }
            offset += size;
        }
        Err(DisplayError::out_of_bounds(index, offset))
    }

    fn offset_of(&self, top: usize) -> usize {
        self.sizes().iter().take(top).sum()
    }

    fn subtree(&self, top: usize) -> Result<Subtree<T>> {
        if let Some(Some(subtree)) = self.subtrees.read().get(top) {
            return Ok(subtree.clone());
        }
        let Some(record) = self.collection.get(top) else {
            return Err(DisplayError::out_of_bounds(top, self.collection.len()));
        };
        let subtree = Arc::new(self.materialize(record)?);

        let mut subtrees = self.subtrees.write();
        if subtrees.len() <= top {
            subtrees.resize(top + 1, None);
        }
        subtrees[top] = Some(subtree.clone());
        tracing::trace!(target: targets::STRATEGY, top, size = subtree.len(), "subtree materialized");
        Ok(subtree)
    }

    fn materialize(&self, root: Arc<T>) -> Result<Vec<DisplayItem<T>>> {
        let mut items: Vec<DisplayItem<T>> = Vec::new();
        // (record, index of the parent item)
        let mut stack: Vec<(Arc<T>, Option<usize>)> = vec![(root, None)];
        while let Some((record, parent)) = stack.pop() {
            let children = record
                .children(&self.options.children_property)
                .unwrap_or_default();
            let node_type = match self.options.node_property.as_deref() {
                Some(name) => Some(NodeType::from_value(record.try_get(name)?.as_ref())),
                None => None,
            };

            let item = CollectionItem::record(record);
            item.set_parent(parent.map(|p| &items[p]));
            item.set_has_children(!children.is_empty());
            item.set_node_type(node_type);

            let position = items.len();
            items.push(item);
            stack.extend(children.into_iter().rev().map(|child| (child, Some(position))));
        }
        Ok(items)
    }

    fn mark_sizes_stale(&mut self) {
        *self.sizes.get_mut() = None;
    }
}

impl<T: Record> ItemsStrategy<T> for MaterializedPath<T> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MaterializedPath
    }

    fn options(&self) -> serde_json::Value {
        serde_json::to_value(&self.options).unwrap_or_default()
    }

    fn source(&self) -> Option<&dyn ItemsStrategy<T>> {
        None
    }

    fn collection(&self) -> RecordList<T> {
        self.collection.clone()
    }

    fn count(&self) -> Result<usize> {
        Ok(self.sizes().iter().sum())
    }

    fn items(&self) -> Result<Vec<DisplayItem<T>>> {
        let mut items = Vec::new();
        for top in 0..self.collection.len() {
            items.extend(self.subtree(top)?.iter().cloned());
        }
        Ok(items)
    }

    fn at(&self, index: usize) -> Result<DisplayItem<T>> {
        let (top, offset) = self.locate(index)?;
        let subtree = self.subtree(top)?;
        subtree
            .get(offset)
            .cloned()
            .ok_or(DisplayError::out_of_bounds(index, self.count()?))
    }

    fn display_index(&self, collection_index: usize) -> Result<Option<usize>> {
        if collection_index >= self.collection.len() {
            return Ok(None);
        }
        Ok(Some(self.offset_of(collection_index)))
    }

    fn collection_index(&self, display_index: usize) -> Result<Option<usize>> {
        match self.locate(display_index) {
            Ok((top, 0)) => Ok(Some(top)),
            Ok(_) | Err(DisplayError::OutOfBounds { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        added: Vec<Arc<T>>,
    ) -> Result<Vec<Option<DisplayItem<T>>>> {
        let count = self.collection.len();
        let start = start.min(count);
        let end = start.saturating_add(delete_count).min(count);
        let added_count = added.len();

        let subtrees = self.subtrees.get_mut();
        subtrees.resize(count, None);
        let removed: Vec<_> = subtrees
            .splice(start..end, std::iter::repeat_n(None, added_count))
            .map(|subtree| subtree.and_then(|items| items.first().cloned()))
            .collect();
        self.collection.splice(start, end - start, added);
        self.mark_sizes_stale();
        Ok(removed)
    }

    fn invalidate(&mut self) {
        self.mark_sizes_stale();
        let snapshot = self.collection.snapshot();
        let subtrees = self.subtrees.get_mut();
        subtrees.resize(snapshot.len(), None);
        for (slot, record) in subtrees.iter_mut().zip(&snapshot) {
            let stale = slot.as_ref().is_some_and(|items| {
                !items
                    .first()
                    .and_then(|item| item.record_contents())
                    .is_some_and(|contents| Arc::ptr_eq(contents, record))
            });
            if stale {
                *slot = None;
            }
        }
    }

    fn reset(&mut self) {
        self.mark_sizes_stale();
        self.subtrees.get_mut().clear();
    }

    fn to_state(&self) -> Result<StrategyState> {
        Ok(StrategyState::new(
            StrategyKind::MaterializedPath,
            serde_json::to_value(&self.options)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_display_core::Row;

    fn node(title: &str, children: Vec<Row>) -> Row {
        Row::new()
            .with("title", title)
            .with_children("children", children)
    }

    fn leaf(title: &str) -> Row {
        Row::new().with("title", title)
    }

    fn fixture() -> MaterializedPath<Row> {
        let rows = vec![
            node("a", vec![node("aa", vec![leaf("aaa")]), leaf("ab")]),
            leaf("b"),
            node("c", vec![leaf("ca"), leaf("cb")]),
        ];
        MaterializedPath::builder()
            .collection(RecordList::new(rows))
            .children_property("children")
            .build()
            .unwrap()
    }

    fn titles(items: &[DisplayItem<Row>]) -> Vec<String> {
        items
            .iter()
            .map(|item| item.get("title").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_pre_order_flattening() {
        let tree = fixture();
        assert_eq!(tree.count().unwrap(), 8);
        assert_eq!(
            titles(&tree.items().unwrap()),
            vec!["a", "aa", "aaa", "ab", "b", "c", "ca", "cb"]
        );
        let items = tree.items().unwrap();
        assert_eq!(items[2].level(), 2);
        assert!(items[0].is_node());
        assert!(items[4].is_leaf());
    }

    #[test]
    fn test_lazy_materialization() {
        let tree = fixture();
        assert_eq!(tree.count().unwrap(), 8);
        assert!(tree.subtrees.read().is_empty());

        let item = tree.at(6).unwrap();
        assert_eq!(item.get("title").unwrap().to_string(), "ca");
        let subtrees = tree.subtrees.read();
        assert!(subtrees[0].is_none());
        assert!(subtrees[2].is_some());
    }

    #[test]
    fn test_identity_and_bounds() {
        let tree = fixture();
        let first = tree.at(3).unwrap();
        assert!(CollectionItem::same_as(&first, &tree.at(3).unwrap()));
        assert!(matches!(
            tree.at(8),
            Err(DisplayError::OutOfBounds { index: 8, .. })
        ));
    }

    #[test]
    fn test_index_translation() {
        let tree = fixture();
        assert_eq!(tree.display_index(0).unwrap(), Some(0));
        assert_eq!(tree.display_index(1).unwrap(), Some(4));
        assert_eq!(tree.display_index(2).unwrap(), Some(5));
        assert_eq!(tree.display_index(3).unwrap(), None);
        assert_eq!(tree.collection_index(5).unwrap(), Some(2));
        assert_eq!(tree.collection_index(1).unwrap(), None);
        assert_eq!(tree.collection_index(99).unwrap(), None);
    }

    #[test]
    fn test_splice_top_level() {
        let mut tree = fixture();
        let a = tree.at(0).unwrap();
        let removed = tree
            .splice(0, 2, vec![Arc::new(node("d", vec![leaf("da")]))])
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert!(CollectionItem::same_as(removed[0].as_ref().unwrap(), &a));
        assert!(removed[1].is_none());
        assert_eq!(
            titles(&tree.items().unwrap()),
            vec!["d", "da", "c", "ca", "cb"]
        );
    }

    #[test]
    fn test_tree_sorter_ascending_and_reversed() {
        let tree = fixture();
        let items = tree.items().unwrap();
        let sorter = MaterializedPath::<Row>::tree_sorter();

        let ascending: Vec<usize> = (0..items.len()).collect();
        assert_eq!(sorter(&items, &ascending), ascending);

        let reversed: Vec<usize> = (0..items.len()).rev().collect();
        let order = sorter(&items, &reversed);
        let sorted: Vec<_> = order.iter().map(|&i| items[i].clone()).collect();
        assert_eq!(
            titles(&sorted),
            vec!["c", "cb", "ca", "b", "a", "ab", "aa", "aaa"]
        );
    }

    #[test]
    fn test_tree_sorter_drops_hidden_descendants() {
        let tree = fixture();
        let items = tree.items().unwrap();
        let sorter = MaterializedPath::<Row>::tree_sorter();
        // "aa" filtered out: "aaa" loses its parent.
        let order = sorter(&items, &[0, 2, 3, 4]);
        assert_eq!(order, vec![0, 3, 4]);
    }

    #[test]
    fn test_node_property() {
        let rows = vec![leaf("folder").with("node", true), leaf("file")];
        let tree = MaterializedPath::builder()
            .collection(RecordList::new(rows))
            .children_property("children")
            .node_property("node")
            .build()
            .unwrap();
        let items = tree.items().unwrap();
        assert!(items[0].is_node());
        assert!(!items[0].has_children());
        assert!(items[1].is_leaf());
    }

    #[test]
    fn test_builder_requires_options() {
        let err = MaterializedPath::<Row>::builder()
            .children_property("children")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DisplayError::MissingOption("collection")));

        let err = MaterializedPath::<Row>::builder()
            .collection(RecordList::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DisplayError::MissingOption("children_property")));
    }

    #[test]
    fn test_state_round_trip() {
        let tree = fixture();
        let state = tree.to_state().unwrap();
        assert_eq!(state.options["children_property"], "children");
        let restored = MaterializedPath::from_state(&state, tree.collection()).unwrap();
        assert_eq!(restored.tree_options(), tree.tree_options());
        assert_eq!(restored.count().unwrap(), 8);
    }
}
