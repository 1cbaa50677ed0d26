//! Error types for Horizon Display core.

use std::fmt;

/// Errors raised by records and collections when a value cannot be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The record has no field with the requested name.
    FieldNotFound {
        /// Name of the missing field.
        name: String,
    },
    /// The field exists but its value cannot be used as requested.
    InvalidValue {
        /// Name of the offending field.
        name: String,
        /// Human-readable description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Create a field-not-found error.
    pub fn field_not_found(name: impl Into<String>) -> Self {
        Self::FieldNotFound { name: name.into() }
    }

    /// Create an invalid-value error.
    pub fn invalid_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldNotFound { name } => write!(f, "Field '{name}' not found"),
            Self::InvalidValue { name, message } => {
                write!(f, "Invalid value for field '{name}': {message}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
