//! The collection display: a strategy chain plus filtering, sorting and a
//! cursor, kept in step with the collection it shows.
//!
//! A [`Projection`] owns an items strategy chain and derives the enumerator
//! maps from it:
//!
//! - the filter map combines the user filters with the built-in visibility
//!   rules (members of collapsed groups and descendants of collapsed nodes are
//!   hidden, and a group header with no member passing the filters is hidden)
//! - the sort map is the visible positions passed through each sorter in turn,
//!   one group run at a time so headers keep their members
//!
//! Every mutation goes through the projection so the chain, the maps and the
//! cursor stay consistent, and listeners are told through
//! [`ProjectionSignals`].
//!
//! Mutation methods are not reentrant: calling one from a slot connected to
//! the same projection's signals is not supported.

use std::cmp::Ordering;
use std::sync::Arc;

use horizon_display_core::logging::{span_names, targets};
use horizon_display_core::{PerfSpan, Record, RecordList, Signal, Value};

use crate::enumerator::{Enumerator, EnumeratorMaps, IndexAction};
use crate::error::{DisplayError, Result};
use crate::item::{CollectionItem, DisplayItem};
use crate::strategy::{Direct, ItemsStrategy, Sorter};

/// Decides whether the item at a strategy position is shown.
pub type ItemFilter<T> = Arc<dyn Fn(&DisplayItem<T>, usize) -> bool + Send + Sync>;

/// Describes a change to the projected items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemsChange {
    /// What happened.
    pub action: IndexAction,
    /// First affected collection index.
    pub start: usize,
    /// Number of affected records.
    pub count: usize,
}

/// Notifications emitted by a [`Projection`].
#[derive(Default)]
pub struct ProjectionSignals {
    /// Records were added, removed or replaced.
    pub items_changed: Signal<ItemsChange>,
    /// Visibility or order changed without changing the records.
    pub layout_changed: Signal<()>,
    /// Everything was rebuilt; the cursor is back before the start.
    pub reset: Signal<()>,
}

/// An ordered, filtered view over a record collection.
///
/// # Example
///
/// ```
/// use horizon_display::{DisplayItem, Projection};
/// use horizon_display_core::{RecordList, Row};
///
/// let rows = RecordList::new(vec![
///     Row::new().with("name", "b"),
///     Row::new().with("name", "a"),
/// ]);
/// let mut projection = Projection::builder().collection(rows).build().unwrap();
/// projection
///     .sort_by(|x, y| {
///         let name = |item: &DisplayItem<Row>| item.get("name").and_then(|v| v.coerced());
///         name(x).cmp(&name(y))
///     })
///     .unwrap();
///
/// projection.push(Row::new().with("name", "c")).unwrap();
/// let names: Vec<_> = projection
///     .items()
///     .iter()
///     .map(|item| item.get("name").unwrap().to_string())
///     .collect();
/// assert_eq!(names, vec!["a", "b", "c"]);
/// ```
pub struct Projection<T> {
    collection: RecordList<T>,
    strategy: Box<dyn ItemsStrategy<T>>,
    filters: Vec<ItemFilter<T>>,
    sorters: Vec<Sorter<T>>,
    enumerator: Enumerator<T>,
    signals: ProjectionSignals,
}

/// Builder for [`Projection`].
pub struct ProjectionBuilder<T> {
    strategy: Option<Box<dyn ItemsStrategy<T>>>,
    collection: Option<RecordList<T>>,
    filters: Vec<ItemFilter<T>>,
    sorters: Vec<Sorter<T>>,
}

impl<T: Send + Sync + 'static> ProjectionBuilder<T> {
    /// Sets the strategy chain.
    pub fn strategy(mut self, strategy: Box<dyn ItemsStrategy<T>>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Shows `collection` directly when no strategy is given.
    pub fn collection(mut self, collection: RecordList<T>) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Adds a filter.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&DisplayItem<T>, usize) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Adds a sorter.
    pub fn sorter(mut self, sorter: Sorter<T>) -> Self {
        self.sorters.push(sorter);
        self
    }

    /// Builds the projection.
    pub fn build(self) -> Result<Projection<T>> {
        let strategy: Box<dyn ItemsStrategy<T>> = match (self.strategy, self.collection) {
            (Some(strategy), _) => strategy,
            (None, Some(collection)) => Box::new(Direct::new(collection)),
            (None, None) => return Err(DisplayError::MissingOption("strategy")),
        };
        let maps = compute_maps(strategy.as_ref(), &self.filters, &self.sorters)?;
        Ok(Projection {
            collection: strategy.collection(),
            strategy,
            filters: self.filters,
            sorters: self.sorters,
            enumerator: Enumerator::builder().maps(maps).build()?,
            signals: ProjectionSignals::default(),
        })
    }
}

impl<T: Send + Sync + 'static> Projection<T> {
    /// Creates a builder.
    pub fn builder() -> ProjectionBuilder<T> {
        ProjectionBuilder {
            strategy: None,
            collection: None,
            filters: Vec::new(),
            sorters: Vec::new(),
        }
    }

    /// Returns the shown collection.
    pub fn collection(&self) -> &RecordList<T> {
        &self.collection
    }

    /// Returns the strategy chain.
    pub fn strategy(&self) -> &dyn ItemsStrategy<T> {
        self.strategy.as_ref()
    }

    /// Returns the signals.
    pub fn signals(&self) -> &ProjectionSignals {
        &self.signals
    }

    /// Returns the cursor.
    pub fn enumerator(&self) -> &Enumerator<T> {
        &self.enumerator
    }

    /// Returns the cursor for navigation.
    pub fn enumerator_mut(&mut self) -> &mut Enumerator<T> {
        &mut self.enumerator
    }

    /// Returns the number of shown items.
    pub fn count(&self) -> usize {
        self.enumerator.count()
    }

    /// Returns the shown item at `index`.
    pub fn at(&self, index: usize) -> Result<DisplayItem<T>> {
        self.enumerator.at(index)
    }

    /// Returns the shown items in order.
    pub fn items(&self) -> Vec<DisplayItem<T>> {
        self.enumerator.iter().collect()
    }

    /// Returns the first position showing `item`.
    pub fn index_of(&self, item: &DisplayItem<T>) -> Option<usize> {
        self.enumerator
            .iter()
            .position(|shown| CollectionItem::same_as(&shown, item))
    }

    /// Translates a shown position into a collection index.
    pub fn collection_index(&self, index: usize) -> Result<Option<usize>> {
        match self.enumerator.maps().sort_map.get(index) {
            Some(&position) => self.strategy.collection_index(position),
            None => Ok(None),
        }
    }

    /// Translates a collection index into the first shown position.
    pub fn display_index(&self, collection_index: usize) -> Result<Option<usize>> {
        let Some(position) = self.strategy.display_index(collection_index)? else {
            return Ok(None);
        };
        Ok(self
            .enumerator
            .maps()
            .sort_map
            .iter()
            .position(|&shown| shown == position))
    }

    /// Appends a record.
    pub fn push(&mut self, record: T) -> Result<Arc<T>> {
        let record = Arc::new(record);
        let at = self.collection.len();
        self.apply_splice(at, 0, vec![record.clone()], IndexAction::Add)?;
        Ok(record)
    }

    /// Inserts a record at collection index `index`.
    pub fn insert(&mut self, index: usize, record: T) -> Result<Arc<T>> {
        let count = self.collection.len();
        if index > count {
            return Err(DisplayError::out_of_bounds(index, count));
        }
        let record = Arc::new(record);
        self.apply_splice(index, 0, vec![record.clone()], IndexAction::Add)?;
        Ok(record)
    }

    /// Removes the record at collection index `index`.
    pub fn remove(&mut self, index: usize) -> Result<Arc<T>> {
        let record = self
            .collection
            .get(index)
            .ok_or_else(|| DisplayError::out_of_bounds(index, self.collection.len()))?;
        self.apply_splice(index, 1, Vec::new(), IndexAction::Remove)?;
        Ok(record)
    }

    /// Replaces the record at collection index `index`, returning the old one.
    pub fn replace(&mut self, index: usize, record: T) -> Result<Arc<T>> {
        let old = self
            .collection
            .get(index)
            .ok_or_else(|| DisplayError::out_of_bounds(index, self.collection.len()))?;
        self.apply_splice(index, 1, vec![Arc::new(record)], IndexAction::Replace)?;
        Ok(old)
    }

    /// Replaces `delete_count` records from `start` with `added`.
    ///
    /// Returns the display items that were removed.
    pub fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        added: Vec<T>,
    ) -> Result<Vec<Option<DisplayItem<T>>>> {
        let action = match (delete_count, added.is_empty()) {
            (0, _) => IndexAction::Add,
            (_, true) => IndexAction::Remove,
            _ => IndexAction::Replace,
        };
        let added = added.into_iter().map(Arc::new).collect();
        self.apply_splice(start, delete_count, added, action)
    }

    /// Expands or collapses a group or node. Returns whether anything changed.
    pub fn set_expanded(&mut self, item: &DisplayItem<T>, expanded: bool) -> Result<bool> {
        if !item.set_expanded(expanded) {
            return Ok(false);
        }
        self.relayout()?;
        Ok(true)
    }

    /// Adds a filter.
    pub fn add_filter<F>(&mut self, filter: F) -> Result<()>
    where
        F: Fn(&DisplayItem<T>, usize) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self.relayout()
    }

    /// Replaces every filter with `filter`.
    pub fn set_filter<F>(&mut self, filter: F) -> Result<()>
    where
        F: Fn(&DisplayItem<T>, usize) -> bool + Send + Sync + 'static,
    {
        self.filters = vec![Arc::new(filter)];
        self.relayout()
    }

    /// Removes every filter.
    pub fn clear_filters(&mut self) -> Result<()> {
        self.filters.clear();
        self.relayout()
    }

    /// Appends a sorter to the pipeline.
    ///
    /// Sorters see one group's members at a time (or the items ahead of the
    /// first header); group headers are never moved.
    pub fn add_sorter(&mut self, sorter: Sorter<T>) -> Result<()> {
        self.sorters.push(sorter);
        self.relayout()
    }

    /// Appends a stable sort by `comparator` to the pipeline.
    pub fn sort_by<F>(&mut self, comparator: F) -> Result<()>
    where
        F: Fn(&DisplayItem<T>, &DisplayItem<T>) -> Ordering + Send + Sync + 'static,
    {
        let sorter: Sorter<T> = Arc::new(move |items: &[DisplayItem<T>], indices: &[usize]| {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| comparator(&items[a], &items[b]));
            sorted
        });
        self.add_sorter(sorter)
    }

    /// Removes every sorter.
    pub fn clear_sorters(&mut self) -> Result<()> {
        self.sorters.clear();
        self.relayout()
    }

    /// Marks the chain stale and recomputes the layout.
    pub fn invalidate(&mut self) -> Result<()> {
        self.strategy.invalidate();
        self.relayout()
    }

    /// Drops every materialized item and rebuilds.
    pub fn reset(&mut self) -> Result<()> {
        self.strategy.reset();
        self.rebuild_after_reset()
    }

    /// Swaps the strategy chain, rebuilding everything.
    pub fn set_strategy(&mut self, strategy: Box<dyn ItemsStrategy<T>>) -> Result<()> {
        self.collection = strategy.collection();
        self.strategy = strategy;
        self.rebuild_after_reset()
    }

    fn apply_splice(
        &mut self,
        start: usize,
        delete_count: usize,
        added: Vec<Arc<T>>,
        action: IndexAction,
    ) -> Result<Vec<Option<DisplayItem<T>>>> {
        let count = delete_count.max(added.len());
        let removed = self.strategy.splice(start, delete_count, added)?;
        self.update(action, start, count)?;
        self.signals.items_changed.emit(ItemsChange {
            action,
            start,
            count,
        });
        Ok(removed)
    }

    fn relayout(&mut self) -> Result<()> {
        self.update(IndexAction::Change, 0, 0)?;
        self.signals.layout_changed.emit(());
        Ok(())
    }

    fn rebuild_after_reset(&mut self) -> Result<()> {
        let _perf = PerfSpan::new("projection_reset");
        self.update(IndexAction::Reset, 0, 0)?;
        self.signals.reset.emit(());
        Ok(())
    }

    fn update(&mut self, action: IndexAction, start: usize, count: usize) -> Result<()> {
        let _span = tracing::debug_span!(
            target: targets::PROJECTION,
            span_names::PROJECTION,
            ?action,
            start,
            count
        )
        .entered();
        let maps = compute_maps(self.strategy.as_ref(), &self.filters, &self.sorters)?;
        tracing::debug!(
            target: targets::PROJECTION,
            items = maps.items.len(),
            shown = maps.sort_map.len(),
            "projection updated"
        );
        self.enumerator.re_index(maps, action, start, count)
    }
}

impl<T: Record> Projection<T> {
    /// Returns the first shown position whose record has `property == value`.
    pub fn index_by_value(&self, property: &str, value: &Value) -> Option<usize> {
        self.enumerator.index_by_value(property, value)
    }
}

fn compute_maps<T: Send + Sync + 'static>(
    strategy: &dyn ItemsStrategy<T>,
    filters: &[ItemFilter<T>],
    sorters: &[Sorter<T>],
) -> Result<EnumeratorMaps<T>> {
    let items = strategy.items()?;
    let passes: Vec<bool> = items
        .iter()
        .enumerate()
        .map(|(index, item)| filters.iter().all(|filter| filter(item, index)))
        .collect();

    let mut filter_map = passes.clone();
    // (header position, whether a member passed the filters)
    let mut header: Option<(usize, bool)> = None;
    for (index, item) in items.iter().enumerate() {
        if item.is_group() {
            if let Some((previous, used)) = header {
                filter_map[previous] &= used;
            }
            header = Some((index, false));
            continue;
        }
        if let Some((_, used)) = header.as_mut() {
            *used |= passes[index];
        }
        let collapsed_group = header.is_some_and(|(position, _)| !items[position].is_expanded());
        filter_map[index] = passes[index] && !collapsed_group && ancestors_expanded(item);
    }
    if let Some((previous, used)) = header {
        filter_map[previous] &= used;
    }

    // Sorters reorder each group's members; headers stay where they are.
    let mut sort_map = Vec::with_capacity(items.len());
    let mut run = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if item.is_group() {
            sort_map.extend(sort_run(&items, std::mem::take(&mut run), sorters));
            if filter_map[index] {
                sort_map.push(index);
            }
        } else if filter_map[index] {
            run.push(index);
        }
    }
    sort_map.extend(sort_run(&items, run, sorters));
    Ok(EnumeratorMaps {
        items,
        filter_map,
        sort_map,
    })
}

fn sort_run<T>(
    items: &[DisplayItem<T>],
    mut run: Vec<usize>,
    sorters: &[Sorter<T>],
) -> Vec<usize> {
    if run.len() > 1 {
        for sorter in sorters {
            run = sorter(items, &run);
        }
    }
    run
}

fn ancestors_expanded<T>(item: &DisplayItem<T>) -> bool {
    let mut current = item.parent();
    while let Some(parent) = current {
        if !parent.is_expanded() {
            return false;
        }
        current = parent.parent();
    }
    true
}
