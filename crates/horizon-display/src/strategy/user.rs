//! Comparator-driven ordering.
//!
//! The first comparator is the primary key, the following ones break ties,
//! and the source position breaks any tie left over, so the result is a
//! stable sort. Without comparators the source order passes through.
//!
//! Splices are applied incrementally: surviving entries keep their relative
//! order and added entries are inserted at their sorted place. The outcome
//! always equals a full resort.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use horizon_display_core::RecordList;
use horizon_display_core::logging::{span_names, targets};

use super::{ItemsStrategy, StrategyKind, StrategyState, item_key};
use crate::error::{DisplayError, Result, check_bounds};
use crate::item::DisplayItem;

/// One entry being compared.
pub struct SortEntry<T> {
    /// The source item.
    pub item: DisplayItem<T>,
    /// Position in the source strategy.
    pub index: usize,
    /// Collection index of the item, if it has one.
    pub collection_index: Option<usize>,
}

impl<T> SortEntry<T> {
    /// Returns the wrapped record, if the item is a record item.
    pub fn record(&self) -> Option<&Arc<T>> {
        self.item.record_contents()
    }
}

/// Orders two entries.
pub type Comparator<T> = Arc<dyn Fn(&SortEntry<T>, &SortEntry<T>) -> Ordering + Send + Sync>;

struct Layout<T> {
    items: Vec<DisplayItem<T>>,
    // Display position -> source position.
    order: Vec<usize>,
    // Source position -> display position.
    inverse: Vec<usize>,
}

/// Reorders its source with a chain of comparators.
///
/// # Example
///
/// ```
/// use horizon_display::{Direct, ItemsStrategy, User};
/// use horizon_display_core::RecordList;
///
/// let numbers = RecordList::new(vec![1, 2, 3]);
/// let sorted = User::builder()
///     .source(Box::new(Direct::new(numbers)))
///     .comparator(|a, b| b.record().cmp(&a.record()))
///     .build()
///     .unwrap();
///
/// let values: Vec<i32> = sorted
///     .items()
///     .unwrap()
///     .iter()
///     .map(|item| **item.record_contents().unwrap())
///     .collect();
/// assert_eq!(values, vec![3, 2, 1]);
/// ```
pub struct User<T> {
    source: Box<dyn ItemsStrategy<T>>,
    comparators: Vec<Comparator<T>>,
    cache: RwLock<Option<Arc<Layout<T>>>>,
}

/// Builder for [`User`].
pub struct UserBuilder<T> {
    source: Option<Box<dyn ItemsStrategy<T>>>,
    comparators: Vec<Comparator<T>>,
}

impl<T: Send + Sync + 'static> UserBuilder<T> {
    /// Sets the source strategy.
    pub fn source(mut self, source: Box<dyn ItemsStrategy<T>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Appends a comparator to the chain.
    pub fn comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&SortEntry<T>, &SortEntry<T>) -> Ordering + Send + Sync + 'static,
    {
        self.comparators.push(Arc::new(comparator));
        self
    }

    /// Builds the strategy.
    pub fn build(self) -> Result<User<T>> {
        Ok(User {
            source: self.source.ok_or(DisplayError::MissingOption("source"))?,
            comparators: self.comparators,
            cache: RwLock::new(None),
        })
    }
}

impl<T: Send + Sync + 'static> User<T> {
    /// Creates a builder.
    pub fn builder() -> UserBuilder<T> {
        UserBuilder {
            source: None,
            comparators: Vec::new(),
        }
    }

    /// Restores a strategy from a snapshot.
    pub fn from_state(
        state: &StrategyState,
        source: Box<dyn ItemsStrategy<T>>,
        comparators: Vec<Comparator<T>>,
    ) -> Result<Self> {
        state.expect_kind(StrategyKind::User)?;
        Ok(User {
            source,
            comparators,
            cache: RwLock::new(None),
        })
    }

    /// Replaces the comparator chain and drops the current order.
    pub fn set_comparators(&mut self, comparators: Vec<Comparator<T>>) {
        self.comparators = comparators;
        *self.cache.get_mut() = None;
    }

    /// Replaces the source strategy and drops the current order.
    pub fn set_source(&mut self, source: Box<dyn ItemsStrategy<T>>) {
        self.source = source;
        *self.cache.get_mut() = None;
    }

    fn compare(&self, a: &SortEntry<T>, b: &SortEntry<T>) -> Ordering {
        self.comparators
            .iter()
            .map(|comparator| comparator(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.index.cmp(&b.index))
    }

    fn entries(&self, items: &[DisplayItem<T>]) -> Result<Vec<SortEntry<T>>> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                Ok(SortEntry {
                    item: item.clone(),
                    index,
                    collection_index: self.source.collection_index(index)?,
                })
            })
            .collect()
    }

    fn layout(&self) -> Result<Arc<Layout<T>>> {
        if let Some(layout) = self.cache.read().as_ref() {
            return Ok(layout.clone());
        }
        let items = self.source.items()?;
        let order = self.full_order(&items)?;
        let layout = Arc::new(Self::assemble(items, order));
        *self.cache.write() = Some(layout.clone());
        Ok(layout)
    }

    fn full_order(&self, items: &[DisplayItem<T>]) -> Result<Vec<usize>> {
        let _span =
            tracing::debug_span!(target: targets::STRATEGY, span_names::REBUILD, kind = "user")
                .entered();
        let mut order: Vec<usize> = (0..items.len()).collect();
        if !self.comparators.is_empty() {
            let entries = self.entries(items)?;
            order.sort_by(|&a, &b| self.compare(&entries[a], &entries[b]));
        }
        tracing::debug!(target: targets::STRATEGY, count = order.len(), "user order rebuilt");
        Ok(order)
    }

    /// Carries the previous order over to the spliced source.
    fn spliced_order(
        &self,
        before: &Layout<T>,
        items: &[DisplayItem<T>],
    ) -> Result<Option<Vec<usize>>> {
        let mut position_of = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if position_of.insert(item_key(item), position).is_some() {
                // Repeated items cannot be told apart by identity.
                return Ok(None);
            }
        }

        let mut placed = vec![false; items.len()];
        let mut order: Vec<usize> = before
            .order
            .iter()
            .filter_map(|&old| position_of.get(&item_key(&before.items[old])).copied())
            .inspect(|&position| placed[position] = true)
            .collect();

        let entries = self.entries(items)?;
        for position in (0..items.len()).filter(|&position| !placed[position]) {
            let at = order.partition_point(|&other| {
                self.compare(&entries[other], &entries[position]) == Ordering::Less
            });
            order.insert(at, position);
        }

        let sorted = order
            .windows(2)
            .all(|pair| self.compare(&entries[pair[0]], &entries[pair[1]]) != Ordering::Greater);
        Ok(sorted.then_some(order))
    }

    fn assemble(source: Vec<DisplayItem<T>>, order: Vec<usize>) -> Layout<T> {
        let mut inverse = vec![0; source.len()];
        for (display, &position) in order.iter().enumerate() {
            inverse[position] = display;
        }
        Layout {
            items: source,
            order,
            inverse,
        }
    }
}

impl<T: Send + Sync + 'static> ItemsStrategy<T> for User<T> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::User
    }

    fn options(&self) -> serde_json::Value {
        serde_json::json!({ "comparators": self.comparators.len() })
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
        let layout = self.layout()?;
        Ok(layout
            .order
            .iter()
            .map(|&position| layout.items[position].clone())
            .collect())
    }

    fn at(&self, index: usize) -> Result<DisplayItem<T>> {
        let layout = self.layout()?;
        check_bounds(index, layout.order.len())?;
        Ok(layout.items[layout.order[index]].clone())
    }

    fn display_index(&self, collection_index: usize) -> Result<Option<usize>> {
        let Some(position) = self.source.display_index(collection_index)? else {
            return Ok(None);
        };
        Ok(self.layout()?.inverse.get(position).copied())
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
        let before = self.cache.get_mut().take();
        let removed = self.source.splice(start, delete_count, added)?;

        if let Some(before) = before {
            let items = self.source.items()?;
            let order = match self.spliced_order(&before, &items)? {
                Some(order) => order,
                None => self.full_order(&items)?,
            };
            tracing::trace!(target: targets::STRATEGY, count = order.len(), "user order spliced");
            *self.cache.get_mut() = Some(Arc::new(Self::assemble(items, order)));
        }
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
        Ok(StrategyState::new(StrategyKind::User, self.options()).with_source(self.source.to_state()?))
    }
}
