//! Error types for the display engine.

use horizon_display_core::CoreError;

/// Result type alias for display operations.
pub type Result<T> = std::result::Result<T, DisplayError>;

/// Errors that can occur while building or navigating a display.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    /// A required construction option was not supplied.
    #[error("Missing required option '{0}'")]
    MissingOption(&'static str),

    /// A construction argument has the wrong shape.
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument { name: &'static str, message: String },

    /// Index outside `[0, count)`.
    #[error("Index {index} is out of bounds (count is {count})")]
    OutOfBounds { index: usize, count: usize },

    /// Cursor position outside `-1..=count`.
    #[error("Position {position} is out of range (count is {count})")]
    InvalidPosition { position: isize, count: usize },

    /// A record lookup failed inside a collaborator.
    #[error(transparent)]
    Record(#[from] CoreError),

    /// A snapshot was restored into the wrong strategy kind.
    #[error("Cannot restore '{found}' state into a '{expected}' strategy")]
    StateMismatch {
        expected: &'static str,
        found: String,
    },

    /// Snapshot (de)serialization failed.
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DisplayError {
    /// Create an invalid-argument error.
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    /// Create an out-of-bounds error.
    pub fn out_of_bounds(index: usize, count: usize) -> Self {
        Self::OutOfBounds { index, count }
    }
}

/// Fails with [`DisplayError::OutOfBounds`] unless `index < count`.
pub(crate) fn check_bounds(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(DisplayError::out_of_bounds(index, count))
    }
}
