//! Structured errors emitted during endpoint configuration validation.

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while validating endpoint settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field contained an invalid value.
    #[error("invalid value for '{field}': {message}")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Human-readable error description.
        message: String,
    },

    /// Two options cannot be enabled together.
    #[error("options '{first}' and '{second}' cannot be combined")]
    IncompatibleOptions {
        /// First of the conflicting options.
        first: &'static str,
        /// Second of the conflicting options.
        second: &'static str,
    },

    /// The configured feature is not available on this platform.
    #[error("'{feature}' is not supported on this platform")]
    UnsupportedPlatform {
        /// Feature that is unavailable.
        feature: &'static str,
    },

    /// A naming pattern failed to parse.
    #[error("invalid naming pattern for '{field}'")]
    Pattern {
        /// Field carrying the pattern.
        field: &'static str,
        /// Underlying pattern error.
        source: sluice_core::CoreError,
    },

    /// A glob pattern failed to compile.
    #[error("invalid glob pattern '{pattern}'")]
    Glob {
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },

    /// A regular expression failed to compile.
    #[error("invalid regular expression '{pattern}'")]
    Regex {
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },
}
