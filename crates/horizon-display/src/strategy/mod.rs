//! Items strategies: interchangeable layers that turn an ordered source into
//! an ordered sequence of display items.
//!
//! Every layer implements [`ItemsStrategy`]. The base layers ([`Direct`] and
//! [`MaterializedPath`]) read a [`RecordList`]; the others wrap another
//! strategy, so a display pipeline is a chain such as
//! `Group(AdjacencyList(Direct))`.
//!
//! Two index spaces meet at every layer:
//!
//! - the *collection index*: position of a record in the base [`RecordList`]
//! - the *display index*: position of an item in this layer's output
//!
//! [`ItemsStrategy::display_index`] and [`ItemsStrategy::collection_index`]
//! translate between them through the whole chain. Synthetic items (group
//! headers, breadcrumbs) have no collection index.
//!
//! # Mutation
//!
//! [`ItemsStrategy::splice`] is forwarded down the chain to the base layer,
//! which edits the shared [`RecordList`]; each layer on the way back up marks
//! its own derived state stale. Mutation methods are not reentrant.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use horizon_display_core::RecordList;

use crate::error::{DisplayError, Result};
use crate::item::DisplayItem;

mod adjacency_list;
mod direct;
mod group;
mod materialized_path;
mod search;
mod user;

pub use adjacency_list::{AdjacencyList, AdjacencyListBuilder, AdjacencyListOptions};
pub use direct::Direct;
pub use group::{Group, GroupBuilder, GroupHandler};
pub use materialized_path::{
    MaterializedPath, MaterializedPathBuilder, MaterializedPathOptions,
};
pub use search::{Search, SearchBuilder};
pub use user::{Comparator, SortEntry, User, UserBuilder};

/// Reorders a set of item indices.
///
/// Receives the full item list and the indices currently in play (already
/// filtered and possibly ordered by earlier sorters) and returns the new
/// order. Returned indices must refer into `items`.
pub type Sorter<T> = Arc<dyn Fn(&[DisplayItem<T>], &[usize]) -> Vec<usize> + Send + Sync>;

/// Identifies a strategy implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One display item per record.
    Direct,
    /// Parent-pointer tree flattening.
    AdjacencyList,
    /// Nested children tree flattening.
    MaterializedPath,
    /// Group headers ahead of their members.
    Group,
    /// Comparator-driven ordering.
    User,
    /// Breadcrumb collapsing of node chains.
    Search,
}

impl StrategyKind {
    /// Returns the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::AdjacencyList => "adjacency_list",
            StrategyKind::MaterializedPath => "materialized_path",
            StrategyKind::Group => "group",
            StrategyKind::User => "user",
            StrategyKind::Search => "search",
        }
    }
}

/// Serializable snapshot of a strategy chain.
///
/// Closures (handlers, comparators) are not part of the snapshot; they are
/// passed again when restoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    /// Which strategy produced the snapshot.
    pub kind: StrategyKind,
    /// The serializable construction options.
    #[serde(rename = "$options")]
    pub options: serde_json::Value,
    /// Strategy specific internal state.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub internal: serde_json::Value,
    /// Snapshot of the wrapped source strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<StrategyState>>,
}

impl StrategyState {
    pub(crate) fn new(kind: StrategyKind, options: serde_json::Value) -> Self {
        Self {
            kind,
            options,
            internal: serde_json::Value::Null,
            source: None,
        }
    }

    pub(crate) fn with_internal(mut self, internal: serde_json::Value) -> Self {
        self.internal = internal;
        self
    }

    pub(crate) fn with_source(mut self, source: StrategyState) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Renders the snapshot as `{"state": {...}}`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let state = serde_json::to_value(self)?;
        let mut wrapper = serde_json::Map::new();
        wrapper.insert("state".to_string(), state);
        Ok(serde_json::Value::Object(wrapper))
    }

    /// Parses a snapshot produced by [`to_json`](Self::to_json).
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let state = value
            .get("state")
            .ok_or(DisplayError::MissingOption("state"))?;
        Ok(Self::deserialize(state)?)
    }

    /// Fails with [`DisplayError::StateMismatch`] unless the kind matches.
    pub(crate) fn expect_kind(&self, kind: StrategyKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(DisplayError::StateMismatch {
                expected: kind.as_str(),
                found: self.kind.as_str().to_string(),
            })
        }
    }

    /// Deserializes the options part.
    pub(crate) fn options<O: for<'de> Deserialize<'de>>(&self) -> Result<O> {
        Ok(O::deserialize(&self.options)?)
    }
}

/// The contract every items strategy implements.
///
/// Reads are fallible because building a layer may consult record fields,
/// and record lookups may fail; such failures are propagated unchanged.
pub trait ItemsStrategy<T>: Send + Sync {
    /// Returns the strategy kind.
    fn kind(&self) -> StrategyKind;

    /// Returns the serializable options, for diagnostics and cloning.
    fn options(&self) -> serde_json::Value;

    /// Returns the wrapped strategy, if this layer wraps one.
    fn source(&self) -> Option<&dyn ItemsStrategy<T>>;

    /// Returns a handle to the base record list.
    fn collection(&self) -> RecordList<T>;

    /// Returns the number of display positions.
    fn count(&self) -> Result<usize>;

    /// Returns a snapshot of every display item in order.
    fn items(&self) -> Result<Vec<DisplayItem<T>>>;

    /// Returns the item at a display position.
    ///
    /// Fails with [`DisplayError::OutOfBounds`] outside `[0, count)`.
    fn at(&self, index: usize) -> Result<DisplayItem<T>>;

    /// Translates a collection index into a display index.
    fn display_index(&self, collection_index: usize) -> Result<Option<usize>>;

    /// Translates a display index into a collection index.
    ///
    /// Synthetic items have no collection index.
    fn collection_index(&self, display_index: usize) -> Result<Option<usize>>;

    /// Replaces `delete_count` records starting at collection index `start`
    /// with `added`.
    ///
    /// Returns the display items that were removed, in removal order, with
    /// `None` for records whose item was never materialized.
    fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        added: Vec<Arc<T>>,
    ) -> Result<Vec<Option<DisplayItem<T>>>>;

    /// Marks derived state stale, keeping item identity where possible.
    fn invalidate(&mut self);

    /// Drops all materialized state.
    fn reset(&mut self);

    /// Captures a snapshot of this layer and its sources.
    fn to_state(&self) -> Result<StrategyState>;
}

/// Address of an item, for identity maps.
pub(crate) fn item_key<T>(item: &DisplayItem<T>) -> usize {
    Arc::as_ptr(item) as usize
}
