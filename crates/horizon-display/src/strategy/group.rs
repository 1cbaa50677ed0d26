//! Group headers ahead of their members.
//!
//! A handler classifies each record item of the source into a group key.
//! Items without a key come first, in source order. Each group follows as its
//! header item and then its members, also in source order.
//!
//! Header instances are kept by key: a group that survives a rebuild keeps
//! both its header item and its place relative to the other surviving groups.
//! A new key is inserted at the place where it is first encountered. Headers
//! of groups left without members are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use horizon_display_core::logging::{span_names, targets};
use horizon_display_core::{RecordList, Value};

use super::{ItemsStrategy, StrategyKind, StrategyState};
use crate::error::{DisplayError, Result, check_bounds};
use crate::item::{CollectionItem, DisplayItem};

/// Classifies a record; `None` leaves it ungrouped.
///
/// Receives the record and its position in the source strategy.
pub type GroupHandler<T> = Arc<dyn Fn(&T, usize) -> Option<Value> + Send + Sync>;

struct Layout<T> {
    items: Vec<DisplayItem<T>>,
    // Display position -> source position; `None` for headers.
    source_of: Vec<Option<usize>>,
    // Source position -> display position.
    display_of: Vec<usize>,
}

/// Inserts group headers ahead of the members of each group.
///
/// # Example
///
/// ```
/// use horizon_display::{Direct, Group, ItemsStrategy};
/// use horizon_display_core::{RecordList, Value};
///
/// let words = RecordList::new(vec!["one", "two", "three"]);
/// let groups = Group::builder()
///     .source(Box::new(Direct::new(words)))
///     .handler(|word: &&str, _| Some(Value::from(format!("#{word}"))))
///     .build()
///     .unwrap();
///
/// assert_eq!(groups.count().unwrap(), 6);
/// assert!(groups.at(0).unwrap().is_group());
/// assert_eq!(groups.collection_index(0).unwrap(), None);
/// assert_eq!(groups.collection_index(1).unwrap(), Some(0));
/// ```
pub struct Group<T> {
    source: Box<dyn ItemsStrategy<T>>,
    handler: Option<GroupHandler<T>>,
    // Header instances in group order; survives invalidation.
    groups: RwLock<Vec<DisplayItem<T>>>,
    cache: RwLock<Option<Arc<Layout<T>>>>,
}

/// Builder for [`Group`].
pub struct GroupBuilder<T> {
    source: Option<Box<dyn ItemsStrategy<T>>>,
    handler: Option<GroupHandler<T>>,
}

impl<T: Send + Sync + 'static> GroupBuilder<T> {
    /// Sets the source strategy.
    pub fn source(mut self, source: Box<dyn ItemsStrategy<T>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the grouping handler.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T, usize) -> Option<Value> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Builds the strategy.
    pub fn build(self) -> Result<Group<T>> {
        Ok(Group {
            source: self.source.ok_or(DisplayError::MissingOption("source"))?,
            handler: self.handler,
            groups: RwLock::new(Vec::new()),
            cache: RwLock::new(None),
        })
    }
}

impl<T: Send + Sync + 'static> Group<T> {
    /// Creates a builder.
    pub fn builder() -> GroupBuilder<T> {
        GroupBuilder {
            source: None,
            handler: None,
        }
    }

    /// Restores a strategy from a snapshot, including its group order.
    pub fn from_state(
        state: &StrategyState,
        source: Box<dyn ItemsStrategy<T>>,
        handler: Option<GroupHandler<T>>,
    ) -> Result<Self> {
        state.expect_kind(StrategyKind::Group)?;
        let keys: Vec<Value> = match state.internal.get("groups") {
            Some(groups) => serde_json::from_value(groups.clone())?,
            None => Vec::new(),
        };
        Ok(Group {
            source,
            handler,
            groups: RwLock::new(keys.into_iter().map(CollectionItem::group).collect()),
            cache: RwLock::new(None),
        })
    }

    /// Replaces the handler.
    ///
    /// Headers whose key still occurs after the change are kept.
    pub fn set_handler(&mut self, handler: Option<GroupHandler<T>>) {
        self.handler = handler;
        *self.cache.get_mut() = None;
    }

    /// Replaces the source strategy.
    pub fn set_source(&mut self, source: Box<dyn ItemsStrategy<T>>) {
        self.source = source;
        *self.cache.get_mut() = None;
    }

    /// Returns the current header items in group order.
    pub fn groups(&self) -> Result<Vec<DisplayItem<T>>> {
        self.layout()?;
        Ok(self.groups.read().clone())
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
        let _span = tracing::debug_span!(target: targets::STRATEGY, span_names::REBUILD, kind = "group")
            .entered();

        let source = self.source.items()?;
        let Some(handler) = self.handler.as_ref() else {
            self.groups.write().clear();
            return Ok(Layout {
                source_of: (0..source.len()).map(Some).collect(),
                display_of: (0..source.len()).collect(),
                items: source,
            });
        };

        let keys: Vec<Option<Value>> = source
            .iter()
            .enumerate()
            .map(|(position, item)| {
                item.record_contents()
                    .and_then(|record| handler(record.as_ref(), position))
            })
            .collect();

        // Keys in order of first encounter.
        let mut seen = HashSet::new();
        let encountered: Vec<&Value> = keys
            .iter()
            .flatten()
            .filter(|key| seen.insert(key.exact_key()))
            .collect();

        let mut groups: Vec<DisplayItem<T>> = self
            .groups
            .read()
            .iter()
            .filter(|header| {
                header
                    .group_key()
                    .is_some_and(|key| seen.contains(&key.exact_key()))
            })
            .cloned()
            .collect();
        let mut known: HashSet<String> = groups
            .iter()
            .filter_map(|header| header.group_key().map(Value::exact_key))
            .collect();
        for (encounter, key) in encountered.iter().enumerate() {
            if known.insert(key.exact_key()) {
                let at = encounter.min(groups.len());
                groups.insert(at, CollectionItem::group((*key).clone()));
            }
        }

        let group_index: HashMap<String, usize> = groups
            .iter()
            .enumerate()
            .filter_map(|(index, header)| header.group_key().map(|key| (key.exact_key(), index)))
            .collect();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];
        let mut ungrouped = Vec::new();
        for (position, key) in keys.iter().enumerate() {
            match key.as_ref().and_then(|key| group_index.get(&key.exact_key())) {
                Some(&group) => members[group].push(position),
                None => ungrouped.push(position),
            }
        }

        let total = source.len() + groups.len();
        let mut layout = Layout {
            items: Vec::with_capacity(total),
            source_of: Vec::with_capacity(total),
            display_of: vec![0; source.len()],
        };
        let place = |layout: &mut Layout<T>, position: usize| {
            layout.display_of[position] = layout.items.len();
            layout.items.push(source[position].clone());
            layout.source_of.push(Some(position));
        };
        for &position in &ungrouped {
            place(&mut layout, position);
        }
        for (header, positions) in groups.iter().zip(&members) {
            layout.items.push(header.clone());
            layout.source_of.push(None);
            for &position in positions {
                place(&mut layout, position);
            }
        }

        tracing::debug!(
            target: targets::STRATEGY,
            groups = groups.len(),
            ungrouped = ungrouped.len(),
            "groups rebuilt"
        );
        *self.groups.write() = groups;
        Ok(layout)
    }
}

impl<T: Send + Sync + 'static> ItemsStrategy<T> for Group<T> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Group
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
        Ok(self.layout()?.display_of.get(position).copied())
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
        self.groups.get_mut().clear();
        *self.cache.get_mut() = None;
    }

    fn to_state(&self) -> Result<StrategyState> {
        let keys: Vec<Value> = self
            .groups
            .read()
            .iter()
            .filter_map(|header| header.group_key().cloned())
            .collect();
        let mut internal = serde_json::Map::new();
        internal.insert("groups".to_string(), serde_json::to_value(keys)?);
        Ok(StrategyState::new(StrategyKind::Group, self.options())
            .with_internal(serde_json::Value::Object(internal))
            .with_source(self.source.to_state()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Direct;

    fn grouped(words: &[&'static str]) -> Group<&'static str> {
        Group::builder()
            .source(Box::new(Direct::new(RecordList::new(words.to_vec()))))
            .handler(|word: &&str, _| Some(Value::from(format!("#{word}"))))
            .build()
            .unwrap()
    }

    fn labels(items: &[DisplayItem<&'static str>]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item.group_key() {
                Some(key) => key.to_string(),
                None => item.record_contents().unwrap().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_interleaves_headers() {
        let groups = grouped(&["one", "two", "three"]);
        assert_eq!(
            labels(&groups.items().unwrap()),
            vec!["#one", "one", "#two", "two", "#three", "three"]
        );
    }

    #[test]
    fn test_index_duality() {
        let groups = grouped(&["one", "two", "three"]);
        for display in 0..6 {
            let expected = (display % 2 == 1).then_some((display - 1) / 2);
            assert_eq!(groups.collection_index(display).unwrap(), expected);
        }
        for collection in 0..3 {
            assert_eq!(
                groups.display_index(collection).unwrap(),
                Some(1 + 2 * collection)
            );
        }
        assert_eq!(groups.display_index(3).unwrap(), None);
    }

    #[test]
    fn test_replace_keeps_neighbour_groups() {
        let mut groups = grouped(&["one", "two", "three"]);
        let before = groups.items().unwrap();

        groups.splice(1, 1, vec![Arc::new("four")]).unwrap();
        let after = groups.items().unwrap();
        assert_eq!(
            labels(&after),
            vec!["#one", "one", "#four", "four", "#three", "three"]
        );
        assert!(CollectionItem::same_as(&before[0], &after[0]));
        assert!(CollectionItem::same_as(&before[4], &after[4]));
    }

    #[test]
    fn test_members_share_one_header() {
        let groups = Group::builder()
            .source(Box::new(Direct::new(RecordList::new(vec![
                "apple", "kiwi", "avocado", "banana",
            ]))))
            .handler(|word: &&str, _| Some(Value::from(&word[..1])))
            .build()
            .unwrap();
        assert_eq!(
            labels(&groups.items().unwrap()),
            vec!["a", "apple", "avocado", "k", "kiwi", "b", "banana"]
        );
    }

    #[test]
    fn test_ungrouped_items_come_first() {
        let groups = Group::builder()
            .source(Box::new(Direct::new(RecordList::new(vec!["x", "-", "y", "="]))))
            .handler(|word: &&str, _| {
                word.chars()
                    .all(char::is_alphabetic)
                    .then(|| Value::from("letters"))
            })
            .build()
            .unwrap();
        assert_eq!(
            labels(&groups.items().unwrap()),
            vec!["-", "=", "letters", "x", "y"]
        );
        assert_eq!(groups.collection_index(1).unwrap(), Some(3));
        assert_eq!(groups.display_index(2).unwrap(), Some(4));
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let mut groups = grouped(&["one", "two"]);
        let removed = groups.splice(0, 1, vec![]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(labels(&groups.items().unwrap()), vec!["#two", "two"]);
        assert_eq!(groups.groups().unwrap().len(), 1);
    }

    #[test]
    fn test_surviving_group_order_is_kept() {
        let list = RecordList::new(vec!["b", "a"]);
        let mut groups = Group::builder()
            .source(Box::new(Direct::new(list.clone())))
            .handler(|word: &&str, _| Some(Value::from(*word)))
            .build()
            .unwrap();
        assert_eq!(labels(&groups.items().unwrap()), vec!["b", "b", "a", "a"]);

        // Reversing the data does not reorder the known groups.
        list.splice(0, 2, vec![Arc::new("a"), Arc::new("b")]);
        groups.invalidate();
        assert_eq!(labels(&groups.items().unwrap()), vec!["b", "b", "a", "a"]);

        groups.reset();
        assert_eq!(labels(&groups.items().unwrap()), vec!["a", "a", "b", "b"]);
    }

    #[test]
    fn test_without_handler_passes_through() {
        let mut groups = grouped(&["one", "two"]);
        groups.set_handler(None);
        assert_eq!(labels(&groups.items().unwrap()), vec!["one", "two"]);
        assert_eq!(groups.collection_index(1).unwrap(), Some(1));
    }

    #[test]
    fn test_identity_between_calls() {
        let groups = grouped(&["one", "two"]);
        for index in 0..4 {
            assert!(CollectionItem::same_as(
                &groups.at(index).unwrap(),
                &groups.at(index).unwrap()
            ));
        }
        assert!(groups.at(4).is_err());
    }

    #[test]
    fn test_state_restores_group_order() {
        let list = RecordList::new(vec!["b", "a"]);
        let groups = Group::builder()
            .source(Box::new(Direct::new(list.clone())))
            .handler(|word: &&str, _| Some(Value::from(*word)))
            .build()
            .unwrap();
        groups.items().unwrap();
        let state = groups.to_state().unwrap();
        assert_eq!(state.internal["groups"], serde_json::json!(["b", "a"]));

        list.splice(0, 2, vec![Arc::new("a"), Arc::new("b")]);
        let source = Direct::from_state(state.source.as_deref().unwrap(), list).unwrap();
        let handler: GroupHandler<&'static str> =
            Arc::new(|word: &&str, _| Some(Value::from(*word)));
        let restored = Group::from_state(&state, Box::new(source), Some(handler)).unwrap();
        assert_eq!(labels(&restored.items().unwrap()), vec!["b", "b", "a", "a"]);
    }
}
