//! Display items: the wrappers a strategy hands out for each display position.
//!
//! A [`DisplayItem`] is an `Arc<CollectionItem<T>>`. Identity matters: a
//! strategy returns the same `Arc` for the same position until its caches are
//! invalidated, so callers may compare items with [`CollectionItem::same_as`].
//!
//! Each item is one of four kinds, fixed at construction:
//!
//! - [`ItemKind::Record`]: wraps one raw record (plain or tree item)
//! - [`ItemKind::Group`]: a group header, contents is the group key
//! - [`ItemKind::Breadcrumbs`]: a collapsed chain of ancestor records
//! - [`ItemKind::Decorated`]: another item seen through a different parent
//!
//! Derived tree state (parent link, child and node flags) is rewritten only by
//! the owning strategy while it rebuilds, never during iteration.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use horizon_display_core::{Record, Value};

/// Shared handle to a display item.
pub type DisplayItem<T> = Arc<CollectionItem<T>>;

/// What a display item wraps.
pub enum ItemKind<T> {
    /// A raw record from the source collection.
    Record(Arc<T>),
    /// A group header; the value is the group key.
    Group(Value),
    /// A collapsed ancestor chain, outermost ancestor first.
    Breadcrumbs(Vec<Arc<T>>),
    /// Another item, re-parented without touching the original.
    Decorated(DisplayItem<T>),
}

/// Borrowed view of an item's contents.
#[derive(Debug)]
pub enum ItemContents<'a, T> {
    /// Raw record contents.
    Record(&'a Arc<T>),
    /// Group key of a header item.
    GroupKey(&'a Value),
    /// Ancestor path of a breadcrumbs item.
    Path(&'a [Arc<T>]),
}

/// Node classification read from a record's node property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// A leaf: never has children.
    Leaf,
    /// A regular node.
    Node,
    /// A node whose own row is not meant to be shown expanded (a "hidden" node).
    HiddenNode,
}

impl NodeType {
    /// Classifies a node property value: `true` is a node, `false` a hidden
    /// node, anything else a leaf.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_bool) {
            Some(true) => NodeType::Node,
            Some(false) => NodeType::HiddenNode,
            None => NodeType::Leaf,
        }
    }
}

struct TreeLink<T> {
    parent: Option<Weak<CollectionItem<T>>>,
    has_children: bool,
    node_type: Option<NodeType>,
}

impl<T> Default for TreeLink<T> {
    fn default() -> Self {
        Self {
            parent: None,
            has_children: false,
            node_type: None,
        }
    }
}

/// A display item.
pub struct CollectionItem<T> {
    kind: ItemKind<T>,
    link: RwLock<TreeLink<T>>,
    expanded: AtomicBool,
}

impl<T> CollectionItem<T> {
    fn with_kind(kind: ItemKind<T>) -> DisplayItem<T> {
        Arc::new(Self {
            kind,
            link: RwLock::new(TreeLink::default()),
            expanded: AtomicBool::new(true),
        })
    }

    /// Creates an item wrapping a raw record.
    pub fn record(contents: Arc<T>) -> DisplayItem<T> {
        Self::with_kind(ItemKind::Record(contents))
    }

    /// Creates a group header item.
    pub fn group(key: Value) -> DisplayItem<T> {
        Self::with_kind(ItemKind::Group(key))
    }

    /// Creates a breadcrumbs item for the given ancestor path.
    pub fn breadcrumbs(path: Vec<Arc<T>>) -> DisplayItem<T> {
        Self::with_kind(ItemKind::Breadcrumbs(path))
    }

    /// Creates a decorated view of `original`.
    ///
    /// The decorator shares the original's contents and node flags but keeps
    /// its own parent link.
    pub fn decorate(original: DisplayItem<T>) -> DisplayItem<T> {
        Self::with_kind(ItemKind::Decorated(original))
    }

    /// Returns the item kind.
    pub fn kind(&self) -> &ItemKind<T> {
        &self.kind
    }

    /// Returns the item contents, looking through decorators.
    pub fn contents(&self) -> ItemContents<'_, T> {
        match &self.kind {
            ItemKind::Record(record) => ItemContents::Record(record),
            ItemKind::Group(key) => ItemContents::GroupKey(key),
            ItemKind::Breadcrumbs(path) => ItemContents::Path(path),
            ItemKind::Decorated(original) => original.contents(),
        }
    }

    /// Returns the raw record, if this item wraps one.
    pub fn record_contents(&self) -> Option<&Arc<T>> {
        match self.contents() {
            ItemContents::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the group key of a header item.
    pub fn group_key(&self) -> Option<&Value> {
        match &self.kind {
            ItemKind::Group(key) => Some(key),
            _ => None,
        }
    }

    /// Returns the ancestor path of a breadcrumbs item.
    pub fn path(&self) -> Option<&[Arc<T>]> {
        match &self.kind {
            ItemKind::Breadcrumbs(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the decorated item, if this is a decorator.
    pub fn decorated(&self) -> Option<&DisplayItem<T>> {
        match &self.kind {
            ItemKind::Decorated(original) => Some(original),
            _ => None,
        }
    }

    /// Returns `true` for group headers.
    pub fn is_group(&self) -> bool {
        matches!(self.kind, ItemKind::Group(_))
    }

    /// Returns `true` for breadcrumbs items.
    pub fn is_breadcrumbs(&self) -> bool {
        matches!(self.kind, ItemKind::Breadcrumbs(_))
    }

    /// Returns `true` if both handles point at the same item.
    pub fn same_as(this: &DisplayItem<T>, other: &DisplayItem<T>) -> bool {
        Arc::ptr_eq(this, other)
    }

    /// Returns the parent item, if it is still alive.
    pub fn parent(&self) -> Option<DisplayItem<T>> {
        self.link.read().parent.as_ref().and_then(Weak::upgrade)
    }

    /// Returns the depth of this item: 0 at the top level.
    pub fn level(&self) -> usize {
        let mut level = 0;
        let mut current = self.parent();
        while let Some(item) = current {
            level += 1;
            current = item.parent();
        }
        level
    }

    /// Returns `true` if the item is known to have child items.
    pub fn has_children(&self) -> bool {
        match &self.kind {
            ItemKind::Decorated(original) => original.has_children(),
            _ => self.link.read().has_children,
        }
    }

    /// Returns the node classification from the node property, if configured.
    pub fn node_type(&self) -> Option<NodeType> {
        match &self.kind {
            ItemKind::Decorated(original) => original.node_type(),
            _ => self.link.read().node_type,
        }
    }

    /// Returns `true` if the item is a tree node (rather than a leaf).
    ///
    /// Uses the node property when one is configured, otherwise whether the
    /// item has children. Breadcrumbs are always nodes; groups never are.
    pub fn is_node(&self) -> bool {
        match &self.kind {
            ItemKind::Group(_) => false,
            ItemKind::Breadcrumbs(_) => true,
            _ => match self.node_type() {
                Some(NodeType::Leaf) => false,
                Some(_) => true,
                None => self.has_children(),
            },
        }
    }

    /// Returns `true` if the item is a leaf.
    pub fn is_leaf(&self) -> bool {
        !self.is_group() && !self.is_node()
    }

    /// Returns the expanded state (nodes and groups start expanded).
    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::Relaxed)
    }

    /// Sets the expanded state.
    ///
    /// Returns `true` if the state changed.
    pub fn set_expanded(&self, expanded: bool) -> bool {
        self.expanded.swap(expanded, Ordering::Relaxed) != expanded
    }

    pub(crate) fn set_parent(&self, parent: Option<&DisplayItem<T>>) {
        self.link.write().parent = parent.map(Arc::downgrade);
    }

    pub(crate) fn set_has_children(&self, has_children: bool) {
        self.link.write().has_children = has_children;
    }

    pub(crate) fn set_node_type(&self, node_type: Option<NodeType>) {
        self.link.write().node_type = node_type;
    }

    /// Clears every derived tree field.
    pub(crate) fn clear_link(&self) {
        *self.link.write() = TreeLink::default();
    }
}

impl<T: Record> CollectionItem<T> {
    /// Reads a field of the wrapped record.
    ///
    /// Group headers and breadcrumbs have no fields and return `None`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.record_contents().and_then(|record| record.get(name))
    }
}

impl<T: fmt::Debug> fmt::Debug for CollectionItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ItemKind::Record(record) => f
                .debug_struct("CollectionItem")
                .field("contents", record)
                .field("level", &self.level())
                .finish(),
            ItemKind::Group(key) => f.debug_struct("GroupItem").field("key", key).finish(),
            ItemKind::Breadcrumbs(path) => f
                .debug_struct("BreadcrumbsItem")
                .field("path", path)
                .finish(),
            ItemKind::Decorated(original) => f
                .debug_struct("DecoratedItem")
                .field("original", original)
                .field("level", &self.level())
                .finish(),
        }
    }
}
