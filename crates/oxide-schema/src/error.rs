//! Error types for schema editing.

use std::fmt;

use thiserror::Error;

use crate::graph::ObjectKind;
use crate::validate::RuleCode;

/// One violated validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    /// Machine-readable rule code.
    pub code: RuleCode,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Every rule a rejected mutation violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    /// Dialect of the database the mutation targeted.
    pub dialect: String,
    /// Violations, in the order they were detected. Never empty.
    pub violations: Vec<RuleViolation>,
}

impl ValidationError {
    /// Whether a rule with `code` was violated.
    #[must_use]
    pub fn has(&self, code: RuleCode) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }

    /// Codes of all violations.
    #[must_use]
    pub fn codes(&self) -> Vec<RuleCode> {
        self.violations.iter().map(|v| v.code).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema validation failed ({})", self.dialect)?;
        for violation in &self.violations {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

/// Errors raised by the schema builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A mutation was rejected before anything was applied.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A lookup by name found an object of another kind.
    #[error("object '{name}' is a {actual}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: ObjectKind,
        actual: ObjectKind,
    },
}

impl SchemaError {
    /// Returns the validation error, if this is one.
    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(error) => Some(error),
            Self::KindMismatch { .. } => None,
        }
    }

    /// Whether this is a validation error that violated `code`.
    #[must_use]
    pub fn violates(&self, code: RuleCode) -> bool {
        self.as_validation().is_some_and(|e| e.has(code))
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_violation() {
        let error = ValidationError {
            dialect: "generic".into(),
            violations: vec![
                RuleViolation {
                    code: RuleCode::NameEmpty,
                    message: "name is empty".into(),
                },
                RuleViolation {
                    code: RuleCode::ObjectRemoved,
                    message: "table #3 is removed".into(),
                },
            ],
        };
        assert_eq!(
            error.to_string(),
            "schema validation failed (generic); [name.empty] name is empty; \
             [object.removed] table #3 is removed"
        );
        assert!(SchemaError::from(error).violates(RuleCode::ObjectRemoved));
    }

    #[test]
    fn test_kind_mismatch_message() {
        let error = SchemaError::KindMismatch {
            name: "users".into(),
            expected: ObjectKind::View,
            actual: ObjectKind::Table,
        };
        assert_eq!(error.to_string(), "object 'users' is a table, expected a view");
    }
}
