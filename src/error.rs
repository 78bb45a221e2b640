use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WanoError>;

#[derive(Debug, Error)]
pub enum WanoError {
    /// Template uses a tag no node type is registered for.
    #[error("WaNo element <{tag}> is not implemented")]
    NotImplemented { tag: String },

    #[error("<{tag}> is missing required attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },

    #[error("duplicate node name at '{0}'")]
    DuplicateName(String),

    #[error("missing element <{0}>")]
    MissingElement(String),

    #[error("invalid value '{value}' for {path}: expected {expected}")]
    InvalidValue {
        path: String,
        value: String,
        expected: &'static str,
    },

    #[error("no node at path '{0}'")]
    UnknownPath(String),

    #[error("node '{path}' does not support {operation}")]
    UnsupportedOperation {
        path: String,
        operation: &'static str,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to render template for '{path}': {message}")]
    Template { path: String, message: String },

    /// A value still carries template markup after the final pass.
    #[error("unresolved placeholder in '{path}': {value}")]
    UnresolvedPlaceholder { path: String, value: String },

    #[error("transfer failed: {0}")]
    Transfer(String),
}

impl WanoError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml(err.to_string())
    }
}
