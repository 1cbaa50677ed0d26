//! Core types for Horizon Display.
//!
//! This crate provides the foundational pieces the display engine builds on:
//!
//! - **Values**: [`Value`], the scalar type read from record fields
//! - **Records**: the [`Record`] row-accessor contract and the bundled [`Row`]
//! - **Collections**: [`RecordList`], a shared ordered list of records
//! - **Signals**: synchronous [`Signal`] notifications for change tracking
//! - **Logging**: `tracing` targets and span names
//!
//! # Example
//!
//! ```
//! use horizon_display_core::{RecordList, Record, Row, Signal};
//!
//! let list = RecordList::new(vec![
//!     Row::new().with("id", 1).with("parent", 0),
//!     Row::new().with("id", 2).with("parent", 1),
//! ]);
//!
//! let appended = Signal::<usize>::new();
//! appended.connect(|index| println!("record appended at {index}"));
//!
//! list.push(Row::new().with("id", 3).with("parent", 1));
//! appended.emit(list.len() - 1);
//!
//! assert_eq!(list.get(2).unwrap().get("id").unwrap().as_int(), Some(3));
//! ```

mod error;
pub mod logging;
mod record;
pub mod signal;
mod value;

pub use error::{CoreError, Result};
pub use logging::{PerfSpan, TreeFormatOptions, TreeStyle};
pub use record::{Record, RecordList, Row, StrictRow};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
pub use value::Value;
