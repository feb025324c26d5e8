//! Error types for validation, generation and storage

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single field was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldErrorReason {
    /// Absent or blank after trimming
    Missing,
    /// Longer than the field allows (in characters)
    TooLong { max: usize },
    /// Not `DD/MM/YYYY` or `YYYY-MM-DD`
    InvalidDate,
    /// A list where text was expected, or the other way round
    WrongType,
    /// Rich text that did not come out of sanitizing as well-formed markup
    Malformed,
}

/// A field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field name, or `field[index].part` for party entries
    pub field: String,
    pub reason: FieldErrorReason,
    /// Human-readable message suitable for redisplaying the form
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, label: &str, reason: FieldErrorReason) -> Self {
        let message = match reason {
            FieldErrorReason::Missing => format!("{} is required", label),
            FieldErrorReason::TooLong { max } => {
                format!("{} exceeds maximum length of {}", label, max)
            }
            FieldErrorReason::InvalidDate => {
                format!("{} must be a date in DD/MM/YYYY or YYYY-MM-DD format", label)
            }
            FieldErrorReason::WrongType => format!("{} has an unexpected value type", label),
            FieldErrorReason::Malformed => format!("{} contains malformed formatting", label),
        };
        Self {
            field: field.into(),
            reason,
            message,
        }
    }
}

/// Every problem found in one request, plus the fields that passed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub accepted: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when at least one error names `field` (or one of its entries)
    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|e| {
            e.field == field
                || e
                    .field
                    .strip_prefix(field)
                    .is_some_and(|rest| rest.starts_with('['))
        })
    }
}

/// Engine errors, one per failure class
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed with {} field error(s)", .0.errors.len())]
    Validation(ValidationReport),

    #[error("Unknown document type: {0}")]
    NotFound(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid template registry: {0}")]
    Registry(String),
}

impl From<zip::result::ZipError> for EngineError {
    fn from(err: zip::result::ZipError) -> Self {
        EngineError::Generation(format!("DOCX package error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_use_label() {
        let err = ValidationError::new("district", "District", FieldErrorReason::Missing);
        assert_eq!(err.message, "District is required");

        let err = ValidationError::new("date", "Date", FieldErrorReason::TooLong { max: 20 });
        assert_eq!(err.message, "Date exceeds maximum length of 20");
    }

    #[test]
    fn test_has_error_for_matches_entries() {
        let report = ValidationReport {
            errors: vec![ValidationError::new(
                "petitioners[1].name",
                "Petitioner name",
                FieldErrorReason::Missing,
            )],
            accepted: vec![],
        };
        assert!(report.has_error_for("petitioners"));
        assert!(!report.has_error_for("petitioner"));
        assert!(!report.has_error_for("respondents"));
    }

    #[test]
    fn test_reason_serializes_with_kind_tag() {
        let json = serde_json::to_value(FieldErrorReason::TooLong { max: 5 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "too_long", "max": 5}));
    }
}
