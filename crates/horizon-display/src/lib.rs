//! Horizon Display: ordered, filtered, grouped and tree projections of a
//! record collection.
//!
//! The engine is built from three layers:
//!
//! - **Items strategies** ([`strategy`]): composable layers that turn a
//!   [`RecordList`] into display items, such as plain rows, trees from parent
//!   links or nested child lists, group headers, user sorting and search
//!   result collapsing
//! - **Enumerator**: a cursor over the strategy output that applies a filter
//!   map and a sort map and survives changes to the collection
//! - **Projection**: the owner that keeps the chain, the maps and the cursor
//!   in step and reports changes through signals
//!
//! # Example
//!
//! ```
//! use horizon_display::{AdjacencyList, Direct, Group, Projection};
//! use horizon_display_core::{Record, RecordList, Row, Value};
//!
//! let rows = RecordList::new(vec![
//!     Row::new().with("id", 1).with("pid", Value::Null).with("team", "red"),
//!     Row::new().with("id", 2).with("pid", 1).with("team", "red"),
//!     Row::new().with("id", 3).with("pid", Value::Null).with("team", "blue"),
//! ]);
//!
//! let tree = AdjacencyList::builder()
//!     .source(Box::new(Direct::new(rows)))
//!     .key_property("id")
//!     .parent_property("pid")
//!     .build()
//!     .unwrap();
//! let groups = Group::builder()
//!     .source(Box::new(tree))
//!     .handler(|row: &Row, _| row.get("team"))
//!     .build()
//!     .unwrap();
//!
//! let projection = Projection::builder().strategy(Box::new(groups)).build().unwrap();
//! assert_eq!(projection.count(), 5);
//! ```
//!
//! [`RecordList`]: horizon_display_core::RecordList

mod debug;
mod enumerator;
mod error;
mod item;
mod projection;
pub mod strategy;

pub use debug::ItemTreeDebug;
pub use enumerator::{Enumerator, EnumeratorBuilder, EnumeratorMaps, IndexAction};
pub use error::{DisplayError, Result};
pub use item::{CollectionItem, DisplayItem, ItemContents, ItemKind, NodeType};
pub use projection::{
    ItemFilter, ItemsChange, Projection, ProjectionBuilder, ProjectionSignals,
};
pub use strategy::{
    AdjacencyList, AdjacencyListBuilder, AdjacencyListOptions, Comparator, Direct, Group,
    GroupBuilder, GroupHandler, ItemsStrategy, MaterializedPath, MaterializedPathBuilder,
    MaterializedPathOptions, Search, SearchBuilder, SortEntry, Sorter, StrategyKind,
    StrategyState, User, UserBuilder,
};
