//! The base layer: one display item per record, in collection order.

use std::sync::Arc;

use parking_lot::RwLock;

use horizon_display_core::RecordList;
use horizon_display_core::logging::targets;

use super::{ItemsStrategy, StrategyKind, StrategyState};
use crate::error::{DisplayError, Result};
use crate::item::{CollectionItem, DisplayItem};

/// Shows every record of a [`RecordList`] as a plain display item.
///
/// Items are created lazily on first access and cached by position, so
/// repeated `at()` calls return the same instance until the record at that
/// position changes.
pub struct Direct<T> {
    collection: RecordList<T>,
    cache: RwLock<Vec<Option<DisplayItem<T>>>>,
}

impl<T: Send + Sync + 'static> Direct<T> {
    /// Creates a direct strategy over `collection`.
    pub fn new(collection: RecordList<T>) -> Self {
        Self {
            collection,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Restores a direct strategy from a snapshot.
    pub fn from_state(state: &StrategyState, collection: RecordList<T>) -> Result<Self> {
        state.expect_kind(StrategyKind::Direct)?;
        Ok(Self::new(collection))
    }

    /// Swaps the underlying collection and drops every cached item.
    pub fn set_collection(&mut self, collection: RecordList<T>) {
        self.collection = collection;
        self.cache.get_mut().clear();
    }

    fn item_at(&self, index: usize) -> Result<DisplayItem<T>> {
        let Some(record) = self.collection.get(index) else {
            return Err(DisplayError::out_of_bounds(index, self.collection.len()));
        };

        if let Some(Some(item)) = self.cache.read().get(index)
            && item
                .record_contents()
                .is_some_and(|contents| Arc::ptr_eq(contents, &record))
        {
            return Ok(item.clone());
        }

        let mut cache = self.cache.write();
        if cache.len() <= index {
            cache.resize(index + 1, None);
        }
        let item = CollectionItem::record(record);
        cache[index] = Some(item.clone());
        Ok(item)
    }
}

impl<T: Send + Sync + 'static> ItemsStrategy<T> for Direct<T> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn options(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    fn source(&self) -> Option<&dyn ItemsStrategy<T>> {
        None
    }

    fn collection(&self) -> RecordList<T> {
        self.collection.clone()
    }

    fn count(&self) -> Result<usize> {
        Ok(self.collection.len())
    }

    fn items(&self) -> Result<Vec<DisplayItem<T>>> {
        (0..self.collection.len())
            .map(|index| self.item_at(index))
            .collect()
    }

    fn at(&self, index: usize) -> Result<DisplayItem<T>> {
        self.item_at(index)
    }

    fn display_index(&self, collection_index: usize) -> Result<Option<usize>> {
        Ok((collection_index < self.collection.len()).then_some(collection_index))
    }

    fn collection_index(&self, display_index: usize) -> Result<Option<usize>> {
        Ok((display_index < self.collection.len()).then_some(display_index))
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

        let cache = self.cache.get_mut();
        cache.resize(count, None);
        let removed: Vec<_> = cache
            .splice(start..end, std::iter::repeat_n(None, added_count))
            .collect();
        self.collection.splice(start, end - start, added);

        tracing::trace!(
            target: targets::STRATEGY,
            start,
            removed = removed.len(),
            added = added_count,
            "direct splice"
        );
        Ok(removed)
    }

    fn invalidate(&mut self) {
        // Keep items whose record is still at the same position.
        let snapshot = self.collection.snapshot();
        let cache = self.cache.get_mut();
        cache.resize(snapshot.len(), None);
        for (slot, record) in cache.iter_mut().zip(&snapshot) {
            let stale = slot.as_ref().is_some_and(|item| {
                !item
                    .record_contents()
                    .is_some_and(|contents| Arc::ptr_eq(contents, record))
            });
            if stale {
                *slot = None;
            }
        }
    }

    fn reset(&mut self) {
        self.cache.get_mut().clear();
    }

    fn to_state(&self) -> Result<StrategyState> {
        Ok(StrategyState::new(StrategyKind::Direct, self.options()))
    }
}
