//! Error types for configuration loading and validation.
//!
//! The per-frame path never fails: unusable data is dropped by omission.
//! Errors only surface where a caller hands the engine something it cannot
//! build from, such as a malformed exercise file or a rule naming a feature
//! that does not exist.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or compiling configuration.
#[derive(Debug, Error)]
pub enum FormError {
    /// A configuration file could not be read or written.
    #[error("Cannot access config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON input was malformed.
    #[error("Cannot parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML input was malformed.
    #[error("Cannot parse TOML config: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A configuration could not be rendered as TOML.
    #[error("Cannot serialize TOML config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// The file extension does not name a known format.
    #[error("Unsupported config format for `{0}` (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    /// A feature name is not part of the known feature set.
    #[error("Unknown feature `{0}`")]
    UnknownFeature(String),

    /// A camera view name is not recognised.
    #[error("Unknown view `{0}` (expected `front` or `side`)")]
    UnknownView(String),

    /// A rule references an unknown feature.
    #[error("Rule `{rule}` references unknown feature `{name}`")]
    RuleFeature { rule: String, name: String },

    /// A rule is missing a field its kind requires.
    #[error("Rule `{rule}` is missing required field `{field}`")]
    MissingField { rule: String, field: &'static str },

    /// Two rules share an id.
    #[error("Duplicate rule id `{0}`")]
    DuplicateRuleId(String),

    /// A PHASE rule has no phase to read aggregates from.
    #[error("Rule `{0}` is evaluated per phase but declares no targetPhase")]
    MissingTargetPhase(String),

    /// A threshold is not a finite number.
    #[error("Rule `{rule}` has a non-finite threshold for view `{view}`")]
    InvalidThreshold { rule: String, view: String },

    /// A tunable is outside its valid range.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl FormError {
    /// Convenience constructor for [`FormError::InvalidValue`].
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        FormError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias for fallible configuration operations.
pub type Result<T> = std::result::Result<T, FormError>;
