//! Error types for tablebook operations

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::slot::SlotTime;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The store's uniqueness guard on active (table, date, time) rejected a write.
    #[error("Slot already taken: table {table_number} on {date} at {time}")]
    SlotTaken {
        table_number: String,
        date: NaiveDate,
        time: SlotTime,
    },

    #[error("Duplicate {entity}: {reason}")]
    Duplicate { entity: &'static str, reason: String },

    /// Store unreachable or timed out. Callers may retry.
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Corrupt record: {reason}")]
    Corrupt { reason: String },
}

/// Field-scoped error messages keyed by API field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for `field`. The first message per field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when empty, otherwise a `ValidationError::Fields`.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Fields(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid fields: {0}")]
    Fields(FieldErrors),
}

impl ValidationError {
    /// Flatten into a field → message map.
    pub fn details(&self) -> FieldErrors {
        match self {
            ValidationError::RequiredFieldMissing { field } => {
                let mut errors = FieldErrors::new();
                errors.add(field.clone(), format!("{} is required", field));
                errors
            }
            ValidationError::InvalidValue { field, reason } => {
                let mut errors = FieldErrors::new();
                errors.add(field.clone(), reason.clone());
                errors
            }
            ValidationError::Fields(errors) => errors.clone(),
        }
    }
}

/// Availability conflicts, reported distinctly from validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Table {table_number} not available on {date} at {time}")]
    SlotUnavailable {
        table_number: String,
        date: NaiveDate,
        time: SlotTime,
    },
}

impl ConflictError {
    pub const FIELD: &'static str = "tableNumber";
    pub const MESSAGE: &'static str = "Table not available at this time";

    /// The API field the conflict is scoped to.
    pub fn field(&self) -> &'static str {
        Self::FIELD
    }

    pub fn details(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.add(Self::FIELD, Self::MESSAGE);
        errors
    }
}

/// Cache layer errors.
///
/// There is no conversion into `EngineError`: cache failures are recovered
/// where they happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache deserialization error: {0}")]
    Deserialization(String),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all engine errors.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        EngineError::Storage(StorageError::NotFound {
            entity,
            key: key.to_string(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Storage(StorageError::NotFound { .. }))
    }

    /// Failures worth retrying: the store could not answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Storage(StorageError::Unavailable { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    /// Field-scoped details for validation failures and conflicts.
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            EngineError::Validation(e) => Some(e.details()),
            EngineError::Conflict(e) => Some(e.details()),
            _ => None,
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// TESTS
// =============================================================================
