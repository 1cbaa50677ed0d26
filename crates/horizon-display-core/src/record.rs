//! Records and the shared collection that holds them.
//!
//! The display engine never looks inside raw contents beyond the [`Record`]
//! contract: read a field by name, check whether a field exists, and (for
//! nested trees) read a list of child records.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::value::Value;

/// Row-accessor contract for raw contents.
///
/// # Example
///
/// ```
/// use horizon_display_core::{Record, Row, Value};
///
/// let row = Row::new().with("id", 1).with("title", "Inbox");
/// assert_eq!(row.get("id"), Some(Value::Int(1)));
/// assert!(row.has("title"));
/// assert!(!row.has("parent"));
/// ```
pub trait Record: Send + Sync + 'static {
    /// Returns the value of the named field, or `None` if the field is absent.
    fn get(&self, name: &str) -> Option<Value>;

    /// Returns `true` if the record has the named field.
    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Fallible field lookup.
    ///
    /// Records backed by a schema override this to report lookup failures;
    /// the display engine propagates such errors unchanged.
    fn try_get(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get(name))
    }

    /// Returns the nested child records stored under `name`, if any.
    fn children(&self, _name: &str) -> Option<Vec<Arc<Self>>>
    where
        Self: Sized,
    {
        None
    }
}

/// A simple record: ordered scalar fields plus named lists of child rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
    children: Vec<(String, Vec<Arc<Row>>)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing an existing value with the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a list of child rows under `name`.
    pub fn with_children(mut self, name: impl Into<String>, children: Vec<Row>) -> Self {
        let name = name.into();
        let children: Vec<Arc<Row>> = children.into_iter().map(Arc::new).collect();
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = children,
            None => self.children.push((name, children)),
        }
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Returns the field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl Record for Row {
    fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn children(&self, name: &str) -> Option<Vec<Arc<Self>>> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }
}

/// A record that fails every lookup it does not know about.
///
/// Wraps a [`Row`] and turns missing fields into [`CoreError::FieldNotFound`]
/// from [`Record::try_get`]; useful where a schema is authoritative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrictRow(pub Row);

impl Record for StrictRow {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name)
    }

    fn try_get(&self, name: &str) -> Result<Option<Value>> {
        match self.0.get(name) {
            Some(value) => Ok(Some(value)),
            None => Err(CoreError::field_not_found(name)),
        }
    }

    fn children(&self, name: &str) -> Option<Vec<Arc<Self>>> {
        self.0.children(name).map(|rows| {
            rows.iter()
                .map(|row| Arc::new(StrictRow(row.as_ref().clone())))
                .collect()
        })
    }
}

/// A shared, ordered collection of records.
///
/// Cloning the handle shares the underlying list. Records are stored as
/// `Arc<T>` so the display layer can hold references without copying.
pub struct RecordList<T> {
    items: Arc<RwLock<Vec<Arc<T>>>>,
}

impl<T> Clone for RecordList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for RecordList<T> {
    fn default() -> Self {
        Self::from_shared(Vec::new())
    }
}

impl<T: Send + Sync + 'static> RecordList<T> {
    /// Creates a list taking ownership of the given records.
    pub fn new(items: Vec<T>) -> Self {
        Self::from_shared(items.into_iter().map(Arc::new).collect())
    }

    /// Creates a list from already shared records.
    pub fn from_shared(items: Vec<Arc<T>>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns the record at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.read().get(index).cloned()
    }

    /// Returns a copy of the current record handles.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    /// Returns the position of the given record (by reference).
    pub fn position_of(&self, record: &Arc<T>) -> Option<usize> {
        self.items.read().iter().position(|r| Arc::ptr_eq(r, record))
    }

    /// Appends a record and returns its shared handle.
    pub fn push(&self, item: T) -> Arc<T> {
        let item = Arc::new(item);
        self.items.write().push(item.clone());
        item
    }

    /// Inserts a record at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, item: T) -> Arc<T> {
        let item = Arc::new(item);
        self.items.write().insert(index, item.clone());
        item
    }

    /// Removes and returns the record at `index`.
    pub fn remove(&self, index: usize) -> Option<Arc<T>> {
        let mut items = self.items.write();
        if index < items.len() {
            Some(items.remove(index))
        } else {
            None
        }
    }

    /// Replaces the record at `index`, returning the previous one.
    pub fn replace(&self, index: usize, item: T) -> Option<Arc<T>> {
        let mut items = self.items.write();
        let slot = items.get_mut(index)?;
        Some(std::mem::replace(slot, Arc::new(item)))
    }

    /// Removes `delete_count` records at `start` and inserts `added` there.
    ///
    /// The range is clamped to the list bounds. Returns the removed records.
    pub fn splice(&self, start: usize, delete_count: usize, added: Vec<Arc<T>>) -> Vec<Arc<T>> {
        let mut items = self.items.write();
        let start = start.min(items.len());
        let end = start.saturating_add(delete_count).min(items.len());
        items.splice(start..end, added).collect()
    }
}
