//! Breadcrumb collapsing for search results over a tree.
//!
//! The source must be tree shaped: its items carry parent links, as produced
//! by [`AdjacencyList`](super::AdjacencyList) or
//! [`MaterializedPath`](super::MaterializedPath).
//!
//! A node directly followed by one of its own child nodes is absorbed. The
//! first node of a chain that is not is replaced by a breadcrumbs item holding
//! the full ancestor path, and the leaves below it are re-parented to the
//! breadcrumbs through decorator items, leaving the source items untouched. A
//! chain of one node keeps the real node.
//!
//! Absorbed source positions are not addressable: [`display_index`] returns
//! the item count for them instead of `None`, which callers can tell apart
//! from records missing from the source altogether.
//!
//! [`display_index`]: ItemsStrategy::display_index

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use horizon_display_core::RecordList;
use horizon_display_core::logging::{span_names, targets};

use super::{ItemsStrategy, StrategyKind, StrategyState, item_key};
use crate::error::{DisplayError, Result, check_bounds};
use crate::item::{CollectionItem, DisplayItem};

struct Layout<T> {
    items: Vec<DisplayItem<T>>,
    // Display position -> source position; `None` for breadcrumbs.
    source_of: Vec<Option<usize>>,
    // Source position -> display position; `None` when absorbed.
    display_of: Vec<Option<usize>>,
}

// Keyed by the address of a source item; the entry keeps that item alive so
// the address cannot be reused while cached.
type ItemArena<T> = HashMap<usize, (DisplayItem<T>, DisplayItem<T>)>;

/// Collapses node chains into breadcrumbs.
pub struct Search<T> {
    source: Box<dyn ItemsStrategy<T>>,
    cache: RwLock<Option<Arc<Layout<T>>>>,
    // Last node of the chain -> breadcrumbs.
    breadcrumbs: Mutex<ItemArena<T>>,
    // Original leaf -> decorator.
    decorators: Mutex<ItemArena<T>>,
}

/// Builder for [`Search`].
pub struct SearchBuilder<T> {
    source: Option<Box<dyn ItemsStrategy<T>>>,
}

impl<T: Send + Sync + 'static> SearchBuilder<T> {
    /// Sets the source strategy.
    pub fn source(mut self, source: Box<dyn ItemsStrategy<T>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Builds the strategy.
    pub fn build(self) -> Result<Search<T>> {
        Ok(Search::with_source(
            self.source.ok_or(DisplayError::MissingOption("source"))?,
        ))
    }
}

/// Per-rebuild working state.
struct Collapse<'a, T> {
    old_breadcrumbs: &'a mut ItemArena<T>,
    old_decorators: &'a mut ItemArena<T>,
    breadcrumbs: ItemArena<T>,
    decorators: ItemArena<T>,
    layout: Layout<T>,
}

impl<T> Collapse<'_, T> {
    fn push(&mut self, item: DisplayItem<T>, source: Option<usize>) {
        if let Some(position) = source {
            self.layout.display_of[position] = Some(self.layout.items.len());
        }
        self.layout.items.push(item);
        self.layout.source_of.push(source);
    }

    /// The item shown for `node`: the node itself or a breadcrumbs item.
    fn representative(&mut self, node: &DisplayItem<T>) -> DisplayItem<T> {
        let mut chain = vec![node.clone()];
        while let Some(parent) = chain.last().and_then(|item| item.parent()) {
            chain.push(parent);
        }
        if chain.len() == 1 {
            return node.clone();
        }
        chain.reverse();
        let path: Vec<Arc<T>> = chain
            .iter()
            .filter_map(|item| item.record_contents().cloned())
            .collect();

        let key = item_key(node);
        let cached = self
            .breadcrumbs
            .get(&key)
            .or_else(|| self.old_breadcrumbs.get(&key))
            .map(|(_, crumbs)| crumbs.clone())
            .filter(|crumbs| {
                crumbs.path().is_some_and(|old| {
                    old.len() == path.len() && old.iter().zip(&path).all(|(a, b)| Arc::ptr_eq(a, b))
                })
            });
        let crumbs = cached.unwrap_or_else(|| CollectionItem::breadcrumbs(path));
        crumbs.set_parent(None);
        self.breadcrumbs.insert(key, (node.clone(), crumbs.clone()));
        crumbs
    }

    fn decorate(&mut self, leaf: &DisplayItem<T>, parent: &DisplayItem<T>) -> DisplayItem<T> {
        let key = item_key(leaf);
        let decorator = self
            .decorators
            .get(&key)
            .or_else(|| self.old_decorators.get(&key))
            .map(|(_, decorator)| decorator.clone())
            .unwrap_or_else(|| CollectionItem::decorate(leaf.clone()));
        decorator.set_parent(Some(parent));
        self.decorators.insert(key, (leaf.clone(), decorator.clone()));
        decorator
    }
}

impl<T: Send + Sync + 'static> Search<T> {
    /// Creates a builder.
    pub fn builder() -> SearchBuilder<T> {
        SearchBuilder { source: None }
    }

    fn with_source(source: Box<dyn ItemsStrategy<T>>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            breadcrumbs: Mutex::new(HashMap::new()),
            decorators: Mutex::new(HashMap::new()),
        }
    }

    /// Restores a strategy from a snapshot.
    pub fn from_state(state: &StrategyState, source: Box<dyn ItemsStrategy<T>>) -> Result<Self> {
        state.expect_kind(StrategyKind::Search)?;
        Ok(Self::with_source(source))
    }

    /// Replaces the source strategy and drops every cached item.
    pub fn set_source(&mut self, source: Box<dyn ItemsStrategy<T>>) {
        self.source = source;
        self.clear();
    }

    fn clear(&mut self) {
        *self.cache.get_mut() = None;
        self.breadcrumbs.get_mut().clear();
        self.decorators.get_mut().clear();
    }

    fn layout(&self) -> Result<Arc<Layout<T>>> {
        if let Some(layout) = self.cache.read().as_ref() {
            return Ok(layout.clone());
        }
        let layout = Arc::new(self.rebuild()?);
        *self.cache.write() = Some(layout.clone());
        Ok(layout)
    }

    fn rebuild(&self) -> Result<Layout<T>> {
        let _span =
            tracing::debug_span!(target: targets::STRATEGY, span_names::REBUILD, kind = "search")
                .entered();

        let source = self.source.items()?;
        let mut position_of: HashMap<usize, usize> = HashMap::new();
        for (position, item) in source.iter().enumerate() {
            position_of.entry(item_key(item)).or_insert(position);
        }

        let mut old_breadcrumbs = self.breadcrumbs.lock();
        let mut old_decorators = self.decorators.lock();
        let mut collapse = Collapse {
            old_breadcrumbs: &mut old_breadcrumbs,
            old_decorators: &mut old_decorators,
            breadcrumbs: HashMap::new(),
            decorators: HashMap::new(),
            layout: Layout {
                items: Vec::with_capacity(source.len()),
                source_of: Vec::with_capacity(source.len()),
                display_of: vec![None; source.len()],
            },
        };
        // Node -> the item standing for it in the output.
        let mut shown: HashMap<usize, DisplayItem<T>> = HashMap::new();

        for (position, item) in source.iter().enumerate() {
            if item.is_group() {
                collapse.push(item.clone(), Some(position));
                continue;
            }

            if item.is_node() {
                let continues = source.get(position + 1).is_some_and(|next| {
                    next.is_node()
                        && next
                            .parent()
                            .is_some_and(|parent| CollectionItem::same_as(&parent, item))
                });
                if continues {
                    continue;
                }
                let representative = collapse.representative(item);
                let real = CollectionItem::same_as(&representative, item);
                shown.insert(item_key(item), representative.clone());
                collapse.push(representative, real.then_some(position));
                continue;
            }

            let Some(parent) = item.parent() else {
                collapse.push(item.clone(), Some(position));
                continue;
            };
            let representative = match shown.get(&item_key(&parent)) {
                Some(representative) => representative.clone(),
                None => {
                    let representative = collapse.representative(&parent);
                    let real = CollectionItem::same_as(&representative, &parent);
                    let parent_position = position_of.get(&item_key(&parent)).copied();
                    shown.insert(item_key(&parent), representative.clone());
                    collapse.push(representative.clone(), parent_position.filter(|_| real));
                    representative
                }
            };
            if CollectionItem::same_as(&representative, &parent) {
                collapse.push(item.clone(), Some(position));
            } else {
                let decorator = collapse.decorate(item, &representative);
                collapse.push(decorator, Some(position));
            }
        }

        let Collapse {
            breadcrumbs,
            decorators,
            layout,
            ..
        } = collapse;
        tracing::debug!(
            target: targets::STRATEGY,
            source = source.len(),
            shown = layout.items.len(),
            breadcrumbs = breadcrumbs.len(),
            "search collapsed"
        );
        *old_breadcrumbs = breadcrumbs;
        *old_decorators = decorators;
        Ok(layout)
    }
}

impl<T: Send + Sync + 'static> ItemsStrategy<T> for Search<T> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Search
    }

    fn options(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    fn source(&self) -> Option<&dyn ItemsStrategy<T>> {
        Some(self.source.as_ref())
    }

    fn collection(&self) -> RecordList<T> {
        self.source.collection()
    }

    fn count(&self) -> Result<usize> {
        Ok(self.layout()?.items.len())
    }

    fn items(&self) -> Result<Vec<DisplayItem<T>>> {
        Ok(self.layout()?.items.clone())
    }

    fn at(&self, index: usize) -> Result<DisplayItem<T>> {
        let layout = self.layout()?;
        check_bounds(index, layout.items.len())?;
        Ok(layout.items[index].clone())
    }

    fn display_index(&self, collection_index: usize) -> Result<Option<usize>> {
        let Some(position) = self.source.display_index(collection_index)? else {
            return Ok(None);
        };
        let layout = self.layout()?;
        Ok(match layout.display_of.get(position) {
            Some(Some(display)) => Some(*display),
            _ => Some(layout.items.len()),
        })
    }

    fn collection_index(&self, display_index: usize) -> Result<Option<usize>> {
        let layout = self.layout()?;
        match layout.source_of.get(display_index) {
            Some(Some(position)) => self.source.collection_index(*position),
            _ => Ok(None),
        }
    }

    fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        added: Vec<Arc<T>>,
    ) -> Result<Vec<Option<DisplayItem<T>>>> {
        let removed = self.source.splice(start, delete_count, added)?;
        *self.cache.get_mut() = None;
        Ok(removed)
    }

    fn invalidate(&mut self) {
        self.source.invalidate();
        *self.cache.get_mut() = None;
    }

    fn reset(&mut self) {
        self.source.reset();
        self.clear();
    }

    fn to_state(&self) -> Result<StrategyState> {
        Ok(StrategyState::new(StrategyKind::Search, self.options())
            .with_source(self.source.to_state()?))
    }
}
