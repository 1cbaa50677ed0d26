//! Parent-pointer tree flattening.
//!
//! Each record names its parent through `parent_property`, resolved against
//! the `key_property` of other records. The output is a depth-first pre-order
//! walk starting from the children of `root`.
//!
//! # Key matching
//!
//! Parents are matched progressively: an exact match of the parent value is
//! tried first, and only when nothing matches exactly does the walk fall back
//! to comparing the string forms, so a numeric `0` parent finds a `"0"` key.
//!
//! # Group anchors
//!
//! Group headers coming from the source stay in front of their members. When
//! the walk moves from a member of one group to a member of another, the other
//! group's header is emitted again, so unrelated siblings are never shown
//! under the wrong header. A header may therefore appear more than once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use horizon_display_core::logging::{span_names, targets};
use horizon_display_core::{Record, RecordList, Value};

use super::{ItemsStrategy, StrategyKind, StrategyState};
use crate::error::{DisplayError, Result, check_bounds};
use crate::item::{DisplayItem, NodeType};

/// Serializable options of an [`AdjacencyList`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjacencyListOptions {
    /// Field holding a record's own key. Without it every record is shown at
    /// the top level.
    #[serde(default)]
    pub key_property: Option<String>,
    /// Field holding the key of the parent record. Without it nothing can be
    /// linked and the strategy is empty.
    #[serde(default)]
    pub parent_property: Option<String>,
    /// Parent value of the top-level records.
    #[serde(default)]
    pub root: Value,
    /// Field classifying a record as node (`true`), hidden node (`false`) or
    /// leaf (anything else).
    #[serde(default)]
    pub node_property: Option<String>,
}

struct Layout<T> {
    // Display position -> source position.
    order: Vec<usize>,
    items: Vec<DisplayItem<T>>,
    // Source position -> first display position.
    first: HashMap<usize, usize>,
}

impl<T> Layout<T> {
    fn empty() -> Self {
        Self {
            order: Vec::new(),
            items: Vec::new(),
            first: HashMap::new(),
        }
    }
}

/// Children of each parent value, bucketed for progressive matching.
#[derive(Default)]
struct ChildIndex {
    exact: HashMap<String, Vec<usize>>,
    loose: HashMap<String, Vec<usize>>,
}

impl ChildIndex {
    fn add(&mut self, parent: &Value, position: usize) {
        self.exact
            .entry(parent.exact_key())
            .or_default()
            .push(position);
        if let Some(coerced) = parent.coerced() {
            self.loose.entry(coerced).or_default().push(position);
        }
    }

    fn children_of(&self, key: &Value) -> &[usize] {
        if let Some(children) = self.exact.get(&key.exact_key()) {
            return children;
        }
        key.coerced()
            .and_then(|coerced| self.loose.get(&coerced))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Flattens a parent-pointer tree in depth-first order.
///
/// # Example
///
/// ```
/// use horizon_display::{AdjacencyList, Direct, ItemsStrategy};
/// use horizon_display_core::{RecordList, Row};
///
/// let rows = RecordList::new(vec![
///     Row::new().with("id", 1).with("pid", 0),
///     Row::new().with("id", 2).with("pid", 0),
///     Row::new().with("id", 11).with("pid", 1),
/// ]);
/// let tree = AdjacencyList::builder()
///     .source(Box::new(Direct::new(rows)))
///     .key_property("id")
///     .parent_property("pid")
///     .root(0)
///     .build()
///     .unwrap();
///
/// let ids: Vec<_> = tree
///     .items()
///     .unwrap()
///     .iter()
///     .map(|item| item.get("id").unwrap().as_int().unwrap())
///     .collect();
/// assert_eq!(ids, vec![1, 11, 2]);
/// ```
pub struct AdjacencyList<T> {
    source: Box<dyn ItemsStrategy<T>>,
    options: AdjacencyListOptions,
    cache: RwLock<Option<Arc<Layout<T>>>>,
}

/// Builder for [`AdjacencyList`].
pub struct AdjacencyListBuilder<T> {
    source: Option<Box<dyn ItemsStrategy<T>>>,
    options: AdjacencyListOptions,
}

impl<T: Record> AdjacencyListBuilder<T> {
    /// Sets the source strategy.
    pub fn source(mut self, source: Box<dyn ItemsStrategy<T>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the key field.
    pub fn key_property(mut self, name: impl Into<String>) -> Self {
        self.options.key_property = Some(name.into());
        self
    }

    /// Sets the parent field.
    pub fn parent_property(mut self, name: impl Into<String>) -> Self {
        self.options.parent_property = Some(name.into());
        self
    }

    /// Sets the root parent value.
    pub fn root(mut self, root: impl Into<Value>) -> Self {
        self.options.root = root.into();
        self
    }

    /// Sets the node classification field.
    pub fn node_property(mut self, name: impl Into<String>) -> Self {
        self.options.node_property = Some(name.into());
        self
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: AdjacencyListOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the strategy.
    pub fn build(self) -> Result<AdjacencyList<T>> {
        Ok(AdjacencyList {
            source: self.source.ok_or(DisplayError::MissingOption("source"))?,
            options: self.options,
            cache: RwLock::new(None),
        })
    }
}

impl<T: Record> AdjacencyList<T> {
    /// Creates a builder.
    pub fn builder() -> AdjacencyListBuilder<T> {
        AdjacencyListBuilder {
            source: None,
            options: AdjacencyListOptions::default(),
        }
    }

    /// Restores a strategy from a snapshot over an already restored source.
    pub fn from_state(state: &StrategyState, source: Box<dyn ItemsStrategy<T>>) -> Result<Self> {
        state.expect_kind(StrategyKind::AdjacencyList)?;
        Self::builder().source(source).options(state.options()?).build()
    }

    /// Returns the options.
    pub fn tree_options(&self) -> &AdjacencyListOptions {
        &self.options
    }

    /// Replaces the options and invalidates the layout.
    pub fn set_options(&mut self, options: AdjacencyListOptions) {
        self.options = options;
        *self.cache.get_mut() = None;
    }

    /// Replaces the source strategy and invalidates the layout.
    pub fn set_source(&mut self, source: Box<dyn ItemsStrategy<T>>) {
        self.source = source;
        *self.cache.get_mut() = None;
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
            tracing::debug_span!(target: targets::STRATEGY, span_names::REBUILD, kind = "adjacency_list")
                .entered();

        let Some(parent_property) = self.options.parent_property.as_deref() else {
            return Ok(Layout::empty());
        };
        let source = self.source.items()?;
        let count = source.len();

        let mut keys: Vec<Option<Value>> = vec![None; count];
        let mut group_of: Vec<Option<usize>> = vec![None; count];
        let mut children = ChildIndex::default();
        let mut roots = Vec::new();
        let mut current_group = None;

        for (position, item) in source.iter().enumerate() {
            if item.is_group() {
                current_group = Some(position);
                continue;
            }
            group_of[position] = current_group;

            let Some(record) = item.record_contents() else {
                roots.push(position);
                continue;
            };
            match self.options.key_property.as_deref() {
                Some(key_property) => {
                    // A record without a key can never be a parent.
                    keys[position] = record
                        .try_get(key_property)?
                        .filter(|key| !key.is_null());
                    let parent = record.try_get(parent_property)?.unwrap_or_default();
                    children.add(&parent, position);
                }
                None => roots.push(position),
            }

            let node_type = match self.options.node_property.as_deref() {
                Some(node_property) => {
                    Some(NodeType::from_value(record.try_get(node_property)?.as_ref()))
                }
                None => None,
            };
            item.set_node_type(node_type);
        }
        if self.options.key_property.is_some() {
            roots = children.children_of(&self.options.root).to_vec();
        }

        let mut layout = Layout::empty();
        let mut visited = vec![false; count];
        let mut current_group = None;
        // (source position, display position of the parent)
        let mut stack: Vec<(usize, Option<usize>)> =
            roots.iter().rev().map(|&position| (position, None)).collect();

        while let Some((position, parent)) = stack.pop() {
            if visited[position] {
                continue;
            }
            visited[position] = true;

            if let Some(group) = group_of[position]
                && current_group != Some(group)
            {
                current_group = Some(group);
                layout.first.entry(group).or_insert(layout.order.len());
                layout.order.push(group);
                layout.items.push(source[group].clone());
            }

            let item = &source[position];
            let display_position = layout.order.len();
            layout.first.entry(position).or_insert(display_position);
            layout.order.push(position);
            layout.items.push(item.clone());
            item.set_parent(parent.map(|p| &layout.items[p]));

            let pending: Vec<usize> = match &keys[position] {
                Some(key) => children
                    .children_of(key)
                    .iter()
                    .copied()
                    .filter(|&child| !visited[child])
                    .collect(),
                None => Vec::new(),
            };
            item.set_has_children(!pending.is_empty());
            stack.extend(
                pending
                    .into_iter()
                    .rev()
                    .map(|child| (child, Some(display_position))),
            );
        }

        // Records that dropped out of the tree must not keep a stale parent.
        for (position, item) in source.iter().enumerate() {
            if !visited[position] && !item.is_group() {
                item.clear_link();
            }
        }

        tracing::debug!(
            target: targets::STRATEGY,
            source = count,
            shown = layout.order.len(),
            "adjacency list rebuilt"
        );
        Ok(layout)
    }
}

impl<T: Record> ItemsStrategy<T> for AdjacencyList<T> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AdjacencyList
    }

    fn options(&self) -> serde_json::Value {
        serde_json::to_value(&self.options).unwrap_or_default()
    }

    fn source(&self) -> Option<&dyn ItemsStrategy<T>> {
        Some(self.source.as_ref())
    }

    fn collection(&self) -> RecordList<T> {
        self.source.collection()
    }

    fn count(&self) -> Result<usize> {
        Ok(self.layout()?.order.len())
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
        Ok(self.layout()?.first.get(&position).copied())
    }

    fn collection_index(&self, display_index: usize) -> Result<Option<usize>> {
        let layout = self.layout()?;
        match layout.order.get(display_index) {
            Some(&position) => self.source.collection_index(position),
            None => Ok(None),
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
        *self.cache.get_mut() = None;
    }

    fn to_state(&self) -> Result<StrategyState> {
        Ok(
            StrategyState::new(StrategyKind::AdjacencyList, serde_json::to_value(&self.options)?)
                .with_source(self.source.to_state()?),
        )
    }
}
