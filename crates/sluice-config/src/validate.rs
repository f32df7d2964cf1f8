//! Parsing helpers for filter configuration.

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::error::{ConfigError, ConfigResult};

/// Compile ant-style glob patterns into a matcher over relative paths.
///
/// # Errors
///
/// Returns [`ConfigError::Glob`] when a pattern does not compile.
pub fn ant_filter<S: AsRef<str>>(patterns: &[S]) -> ConfigResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        builder.add(Glob::new(pattern).map_err(|source| ConfigError::Glob {
            pattern: pattern.to_string(),
            source,
        })?);
    }
    builder.build().map_err(|source| ConfigError::Glob {
        pattern: String::new(),
        source,
    })
}

/// Compile a name regular expression.
///
/// # Errors
///
/// Returns [`ConfigError::Regex`] when the pattern does not compile.
pub fn name_regex(pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern).map_err(|source| ConfigError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Split a comma-separated extension list, lowercased and trimmed.
#[must_use]
pub fn ext_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
