//! Cursor over a filtered, sorted view of display items.
//!
//! An [`Enumerator`] walks the virtual index space described by three parallel
//! pieces of data ([`EnumeratorMaps`]):
//!
//! - `items`: the display items, addressed by *source index*
//! - `filter_map`: visibility per source index
//! - `sort_map`: display position → source index (may repeat indices)
//!
//! Navigation trusts `sort_map` to already exclude hidden entries; the filter
//! map is consulted when re-indexing to decide whether the current item is
//! still visible.
//!
//! # Re-indexing
//!
//! When the maps change underneath a cursor (items added, removed, hidden or
//! re-sorted), [`Enumerator::re_index`] moves the cursor so that the current
//! item stays current if it survived. If it did not, the cursor enters a
//! "lost" state: [`current`](Enumerator::current) is `None`, but
//! [`move_next`](Enumerator::move_next) lands on the first surviving item that
//! followed the lost one and [`move_previous`](Enumerator::move_previous) on the
//! item just before that.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_display::{CollectionItem, Enumerator};
//!
//! let items: Vec<_> = ["a", "b", "c"]
//!     .into_iter()
//!     .map(|s| CollectionItem::record(Arc::new(s)))
//!     .collect();
//!
//! let mut enumerator = Enumerator::builder()
//!     .items(items)
//!     .filter_map(vec![true, true, true])
//!     .sort_map(vec![2, 0, 1])
//!     .build()
//!     .unwrap();
//!
//! assert!(enumerator.move_next());
//! assert_eq!(**enumerator.current().unwrap().record_contents().unwrap(), "c");
//! ```

use horizon_display_core::logging::{span_names, targets};
use horizon_display_core::{Record, Value};

use crate::error::{check_bounds, DisplayError, Result};
use crate::item::{CollectionItem, DisplayItem};

/// The change that made a re-index necessary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// Items were added.
    Add,
    /// Items were removed.
    Remove,
    /// Items were replaced in place.
    Replace,
    /// Items were moved.
    Move,
    /// Visibility or order changed without structural changes.
    Change,
    /// Everything changed; the cursor returns before the start.
    Reset,
}

/// The three index structures an enumerator walks.
pub struct EnumeratorMaps<T> {
    /// Display items addressed by source index.
    pub items: Vec<DisplayItem<T>>,
    /// Visibility per source index; same length as `items`.
    pub filter_map: Vec<bool>,
    /// Display position → source index.
    pub sort_map: Vec<usize>,
}

impl<T> Clone for EnumeratorMaps<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            filter_map: self.filter_map.clone(),
            sort_map: self.sort_map.clone(),
        }
    }
}

impl<T> EnumeratorMaps<T> {
    /// Maps showing every item in its natural order.
    pub fn identity(items: Vec<DisplayItem<T>>) -> Self {
        let count = items.len();
        Self {
            items,
            filter_map: vec![true; count],
            sort_map: (0..count).collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.filter_map.len() != self.items.len() {
            return Err(DisplayError::invalid_argument(
                "filter_map",
                format!(
                    "length {} does not match {} items",
                    self.filter_map.len(),
                    self.items.len()
                ),
            ));
        }
        if let Some(&bad) = self.sort_map.iter().find(|&&i| i >= self.items.len()) {
            return Err(DisplayError::invalid_argument(
                "sort_map",
                format!("source index {bad} is out of range for {} items", self.items.len()),
            ));
        }
        Ok(())
    }

    fn resolve(&self, position: usize) -> &DisplayItem<T> {
        &self.items[self.sort_map[position]]
    }

    /// Visible position of `item` closest to `near`.
    fn find_visible(&self, item: &DisplayItem<T>, near: usize) -> Option<usize> {
        self.sort_map
            .iter()
            .enumerate()
            .filter(|&(_, &source)| {
                self.filter_map[source] && CollectionItem::same_as(&self.items[source], item)
            })
            .map(|(position, _)| position)
            .min_by_key(|&position| position.abs_diff(near))
    }
}

/// Builder for [`Enumerator`]. All three maps are required.
pub struct EnumeratorBuilder<T> {
    items: Option<Vec<DisplayItem<T>>>,
    filter_map: Option<Vec<bool>>,
    sort_map: Option<Vec<usize>>,
}

impl<T> Default for EnumeratorBuilder<T> {
    fn default() -> Self {
        Self {
            items: None,
            filter_map: None,
            sort_map: None,
        }
    }
}

impl<T> EnumeratorBuilder<T> {
    /// Sets the items.
    pub fn items(mut self, items: Vec<DisplayItem<T>>) -> Self {
        self.items = Some(items);
        self
    }

    /// Sets the filter map.
    pub fn filter_map(mut self, filter_map: Vec<bool>) -> Self {
        self.filter_map = Some(filter_map);
        self
    }

    /// Sets the sort map.
    pub fn sort_map(mut self, sort_map: Vec<usize>) -> Self {
        self.sort_map = Some(sort_map);
        self
    }

    /// Sets all three maps at once.
    pub fn maps(self, maps: EnumeratorMaps<T>) -> Self {
        self.items(maps.items)
            .filter_map(maps.filter_map)
            .sort_map(maps.sort_map)
    }

    /// Builds the enumerator, validating the maps.
    pub fn build(self) -> Result<Enumerator<T>> {
        let maps = EnumeratorMaps {
            items: self.items.ok_or(DisplayError::MissingOption("items"))?,
            filter_map: self
                .filter_map
                .ok_or(DisplayError::MissingOption("filter_map"))?,
            sort_map: self.sort_map.ok_or(DisplayError::MissingOption("sort_map"))?,
        };
        maps.validate()?;
        Ok(Enumerator {
            maps,
            position: -1,
            current: None,
            lost: false,
        })
    }
}

/// A stateful cursor over display items.
pub struct Enumerator<T> {
    maps: EnumeratorMaps<T>,
    position: isize,
    current: Option<DisplayItem<T>>,
    // The current item vanished during re-indexing; the cursor sits in the
    // gap just before `position`.
    lost: bool,
}

impl<T> Clone for Enumerator<T> {
    fn clone(&self) -> Self {
        Self {
            maps: self.maps.clone(),
            position: self.position,
            current: self.current.clone(),
            lost: self.lost,
        }
    }
}

impl<T> Enumerator<T> {
    /// Creates a builder.
    pub fn builder() -> EnumeratorBuilder<T> {
        EnumeratorBuilder::default()
    }

    /// Returns the maps being walked.
    pub fn maps(&self) -> &EnumeratorMaps<T> {
        &self.maps
    }

    /// Returns the number of display positions.
    pub fn count(&self) -> usize {
        self.maps.sort_map.len()
    }

    /// Returns the item at display position `index` without moving the cursor.
    pub fn at(&self, index: usize) -> Result<DisplayItem<T>> {
        check_bounds(index, self.count())?;
        Ok(self.maps.resolve(index).clone())
    }

    /// Returns the current item, if the cursor is on one.
    pub fn current(&self) -> Option<DisplayItem<T>> {
        self.current.clone()
    }

    /// Returns the cursor position; `-1` is before the start.
    pub fn position(&self) -> isize {
        self.position
    }

    /// Moves the cursor to `position`.
    ///
    /// `-1` (before start) and `count` (after end) are legal; anything else
    /// outside `0..count` fails with [`DisplayError::InvalidPosition`].
    pub fn set_position(&mut self, position: isize) -> Result<()> {
        let count = self.count();
        if position < -1 || position > count as isize {
            return Err(DisplayError::InvalidPosition { position, count });
        }
        self.place(position);
        Ok(())
    }

    /// Moves the cursor to the first position showing `item`.
    ///
    /// Returns `false` and resets the cursor if the item is not shown.
    pub fn set_current(&mut self, item: &DisplayItem<T>) -> bool {
        let found = (0..self.count())
            .find(|&position| CollectionItem::same_as(self.maps.resolve(position), item));
        match found {
            Some(position) => {
                self.place(position as isize);
                true
            }
            None => {
                self.reset();
                false
            }
        }
    }

    /// Advances the cursor. Returns whether a current item is available.
    pub fn move_next(&mut self) -> bool {
        let next = if self.lost {
            self.position
        } else {
            self.position + 1
        };
        let count = self.count() as isize;
        self.place(next.min(count));
        tracing::trace!(target: targets::ENUMERATOR, position = self.position, "move_next");
        self.current.is_some()
    }

    /// Moves the cursor back. Returns whether a current item is available.
    pub fn move_previous(&mut self) -> bool {
        let previous = (self.position - 1).max(-1);
        self.place(previous);
        tracing::trace!(target: targets::ENUMERATOR, position = self.position, "move_previous");
        self.current.is_some()
    }

    /// Moves the cursor before the start, keeping the maps.
    pub fn reset(&mut self) {
        self.place(-1);
    }

    /// Iterates the items in display order without touching the cursor.
    pub fn iter(&self) -> impl Iterator<Item = DisplayItem<T>> + '_ {
        self.maps
            .sort_map
            .iter()
            .map(move |&source| self.maps.items[source].clone())
    }

    /// Replaces the maps after an out-of-band change and repositions the cursor.
    ///
    /// `start` and `count` describe the changed range in source indices; they
    /// are informational, since the cursor is tracked by item identity.
    pub fn re_index(
        &mut self,
        maps: EnumeratorMaps<T>,
        action: IndexAction,
        start: usize,
        count: usize,
    ) -> Result<()> {
        let _span =
            tracing::trace_span!(target: targets::ENUMERATOR, span_names::RE_INDEX).entered();
        maps.validate()?;
        let old = std::mem::replace(&mut self.maps, maps);
        let old_count = old.sort_map.len();
        tracing::trace!(
            target: targets::ENUMERATOR,
            ?action,
            start,
            count,
            position = self.position,
            "re_index"
        );

        if action == IndexAction::Reset || self.position < 0 {
            self.reset();
            return Ok(());
        }
        let old_position = self.position as usize;
        if old_position >= old_count {
            self.place(self.count() as isize);
            return Ok(());
        }

        if !self.lost {
            if let Some(current) = self.current.clone() {
                if let Some(position) = self.maps.find_visible(&current, old_position) {
                    self.place(position as isize);
                    return Ok(());
                }
            }
        }

        // The current item is gone: anchor the gap on the first survivor that
        // followed it in the old order.
        let anchor_from = if self.lost {
            old_position
        } else {
            old_position + 1
        };
        let gap = (anchor_from..old_count)
            .find_map(|q| self.maps.find_visible(old.resolve(q), q))
            .unwrap_or(self.count());
        self.position = gap as isize;
        self.current = None;
        self.lost = true;
        Ok(())
    }

    fn place(&mut self, position: isize) {
        self.position = position;
        self.lost = false;
        self.current = if position >= 0 && (position as usize) < self.count() {
            Some(self.maps.resolve(position as usize).clone())
        } else {
            None
        };
    }
}

impl<T: Record> Enumerator<T> {
    /// Returns the first display position whose record has `property == value`.
    ///
    /// The cursor is not moved.
    pub fn index_by_value(&self, property: &str, value: &Value) -> Option<usize> {
        (0..self.count()).find(|&position| {
            self.maps
                .resolve(position)
                .get(property)
                .is_some_and(|v| &v == value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_display_core::Row;
    use std::sync::Arc;

    fn items(values: &[i32]) -> Vec<DisplayItem<i32>> {
        values
            .iter()
            .map(|&v| CollectionItem::record(Arc::new(v)))
            .collect()
    }

    fn value(item: Option<DisplayItem<i32>>) -> Option<i32> {
        item.map(|item| **item.record_contents().unwrap())
    }

    fn enumerator(values: &[i32], sort_map: Vec<usize>) -> Enumerator<i32> {
        Enumerator::builder()
            .items(items(values))
            .filter_map(vec![true; values.len()])
            .sort_map(sort_map)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_all_maps() {
        let err = Enumerator::<i32>::builder()
            .items(items(&[1]))
            .filter_map(vec![true])
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DisplayError::MissingOption("sort_map")));

        let err = Enumerator::<i32>::builder()
            .sort_map(vec![])
            .filter_map(vec![])
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DisplayError::MissingOption("items")));
    }

    #[test]
    fn test_builder_rejects_wrong_shapes() {
        let err = Enumerator::builder()
            .items(items(&[1, 2]))
            .filter_map(vec![true])
            .sort_map(vec![0])
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DisplayError::InvalidArgument { name: "filter_map", .. }
        ));

        let err = Enumerator::builder()
            .items(items(&[1]))
            .filter_map(vec![true])
            .sort_map(vec![3])
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DisplayError::InvalidArgument { name: "sort_map", .. }
        ));
    }

    #[test]
    fn test_walks_sort_map_order_and_back() {
        let mut e = enumerator(&[10, 20, 30, 40], vec![3, 1, 1, 0]);
        assert_eq!(e.position(), -1);
        assert!(e.current().is_none());

        let mut forward = Vec::new();
        while e.move_next() {
            forward.push(value(e.current()).unwrap());
        }
        assert_eq!(forward, vec![40, 20, 20, 10]);
        assert!(!e.move_next());
        assert!(e.current().is_none());
        assert_eq!(e.position(), 4);

        let mut backward = Vec::new();
        while e.move_previous() {
            backward.push(value(e.current()).unwrap());
        }
        assert_eq!(backward, vec![10, 20, 20, 40]);
        assert_eq!(e.position(), -1);
        assert!(!e.move_previous());
    }

    #[test]
    fn test_count_follows_sort_map() {
        let e = enumerator(&[1, 2, 3], vec![0, 0, 1, 2, 2]);
        assert_eq!(e.count(), 5);
        let e = enumerator(&[1, 2, 3], vec![2]);
        assert_eq!(e.count(), 1);
        assert_eq!(value(Some(e.at(0).unwrap())), Some(3));
        assert!(matches!(
            e.at(1),
            Err(DisplayError::OutOfBounds { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_set_position_bounds() {
        let mut e = enumerator(&[1, 2, 3], vec![0, 1, 2]);
        e.set_position(1).unwrap();
        assert_eq!(value(e.current()), Some(2));
        e.set_position(-1).unwrap();
        assert!(e.current().is_none());
        e.set_position(3).unwrap();
        assert!(e.current().is_none());
        assert!(matches!(
            e.set_position(4),
            Err(DisplayError::InvalidPosition { position: 4, count: 3 })
        ));
        assert!(e.set_position(-2).is_err());
    }

    #[test]
    fn test_set_current_uses_first_occurrence() {
        let mut e = enumerator(&[1, 2, 3], vec![2, 1, 0, 1]);
        let item = e.maps().items[1].clone();
        assert!(e.set_current(&item));
        assert_eq!(e.position(), 1);

        let stranger = CollectionItem::record(Arc::new(2));
        assert!(!e.set_current(&stranger));
        assert_eq!(e.position(), -1);
    }

    #[test]
    fn test_index_by_value_keeps_cursor() {
        let rows: Vec<_> = (1..=3)
            .map(|id| CollectionItem::record(Arc::new(Row::new().with("id", id))))
            .collect();
        let mut e = Enumerator::builder()
            .maps(EnumeratorMaps::identity(rows))
            .build()
            .unwrap();
        e.set_position(0).unwrap();
        let before = e.current().unwrap();

        assert_eq!(e.index_by_value("id", &Value::from(3)), Some(2));
        assert_eq!(e.index_by_value("id", &Value::from(9)), None);
        assert_eq!(e.position(), 0);
        assert!(CollectionItem::same_as(&e.current().unwrap(), &before));
    }

    #[test]
    fn test_iter_does_not_move_cursor() {
        let e = enumerator(&[5, 6], vec![1, 0]);
        let seen: Vec<_> = e.iter().map(|i| **i.record_contents().unwrap()).collect();
        assert_eq!(seen, vec![6, 5]);
        assert_eq!(e.position(), -1);
    }

    #[test]
    fn test_reset_keeps_maps() {
        let mut e = enumerator(&[1, 2], vec![0, 1]);
        e.move_next();
        e.reset();
        assert_eq!(e.position(), -1);
        assert_eq!(e.count(), 2);
    }
}
