use std::path::PathBuf;
use thiserror::Error;

use crate::types::{FlagType, Scope};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} not found: {path}{origin}")]
    NotFound {
        what: String,
        path: PathBuf,
        /// Trailing context such as the option or variable that named the path.
        origin: String,
    },

    #[error("Expected a file but found a directory: {path}{origin}")]
    IsADirectory { path: PathBuf, origin: String },

    #[error("{location}: Path \"{path}\" does not point to a directory")]
    NotADirectory { location: String, path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse schema document {path}: {source}")]
    SchemaParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    FileParse { path: PathBuf, reason: String },

    #[error("{location}: {message}")]
    Format { location: String, message: String },

    #[error("{location}: Verbs {verbs:?} are not supported")]
    UnsupportedVerbs { location: String, verbs: Vec<String> },

    #[error("{location}: \"--{cli_form}\" is not recognized as a valid {} flag.", .scope.describe())]
    UnrecognizedFlag {
        location: String,
        flag: String,
        cli_form: String,
        scope: Scope,
    },

    #[error("{message} ({} unrecognized)", .errors.len())]
    UnrecognizedFlags {
        message: String,
        errors: Vec<ConfigError>,
    },

    #[error("Flag '{flag}': value {value:?} could not be coerced to {expected}: {reason}")]
    Cast {
        flag: String,
        value: String,
        expected: FlagType,
        reason: String,
    },

    #[error(
        "Errors were raised during coercion of internal {} flag values ({} failed)",
        .scope.describe(),
        .errors.len()
    )]
    CastErrors {
        scope: Scope,
        errors: Vec<ConfigError>,
    },

    #[error("{location}: Invalid environment variable names {names:?}; names must be in constant case and start with `DBT_`")]
    InvalidEnvVarNames {
        location: String,
        names: Vec<String>,
    },

    #[error("Validation failed at {path}: {reason}")]
    SchemaValidation { path: String, reason: String },

    #[error("{key} must be defined ({hint})")]
    MissingRequired { key: String, hint: String },

    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

impl ConfigError {
    /// Individual errors bundled in an aggregate. Empty for non-aggregate variants.
    pub fn sub_errors(&self) -> &[ConfigError] {
        match self {
            ConfigError::UnrecognizedFlags { errors, .. } | ConfigError::CastErrors { errors, .. } => {
                errors
            }
            _ => &[],
        }
    }
}
