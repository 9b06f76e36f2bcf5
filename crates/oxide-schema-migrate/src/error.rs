//! Error types for rendering and edit scripts.

use std::path::PathBuf;

use oxide_schema::SchemaError;

use crate::dialect::RenderError;

/// Errors raised while loading, applying or rendering an edit script.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The schema builder rejected an edit.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An action cannot be expressed in the target dialect.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// No renderer is registered under this name.
    #[error("Unknown dialect '{0}' (expected one of: generic, mysql)")]
    UnknownDialect(String),

    /// An object path in a script is malformed.
    #[error("Invalid object path '{0}'")]
    InvalidPath(String),

    /// An edit failed; wraps the underlying error with its position.
    #[error("{section}[{index}]: {source}")]
    Edit {
        /// Script section, `baseline` or `changes`.
        section: &'static str,
        /// Position of the edit within its section.
        index: usize,
        /// What went wrong.
        #[source]
        source: Box<MigrateError>,
    },

    /// Failed to read a script file.
    #[error("Failed to read script '{path}': {source}")]
    ReadScript {
        /// Path of the script.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// IO error while writing output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migrate operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_error_names_position() {
        let error = MigrateError::Edit {
            section: "changes",
            index: 3,
            source: Box::new(MigrateError::InvalidPath("a..b".into())),
        };
        assert_eq!(error.to_string(), "changes[3]: Invalid object path 'a..b'");
    }
}
