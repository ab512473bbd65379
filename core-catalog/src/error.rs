use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A concurrent write claimed the same `(title, isbn, copy_number)` slot.
    /// Retrying the operation recomputes the copy number.
    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Corrupt {entity_type} row {id}: {message}")]
    Corrupt {
        entity_type: String,
        id: String,
        message: String,
    },
}

impl CatalogError {
    pub(crate) fn not_found(entity_type: &str, id: &str) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the caller may simply retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Message for the `{error: string}` representation.
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidInput { message, .. } => message.clone(),
            Self::NotFound { entity_type, .. } => format!("{} not found", entity_type),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Field-level validation messages, rendered as `{field: [messages]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{} {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_render_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("isbn", "has already been taken");
        errors.add("title", "can't be blank");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "isbn": ["has already been taken"],
                "title": ["can't be blank"]
            })
        );
        assert_eq!(
            errors.to_string(),
            "isbn has already been taken, title can't be blank"
        );
    }

    #[test]
    fn empty_validation_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn client_message_uses_bare_input_message() {
        let err = CatalogError::invalid_input("page", "Page must be a positive integer");
        assert_eq!(err.client_message(), "Page must be a positive integer");
        assert!(!err.is_retryable());
        assert!(CatalogError::Conflict("copy".into()).is_retryable());
    }
}
