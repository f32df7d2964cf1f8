//! `${file:*}` naming patterns.
//!
//! Move, pre-move, temp-file, and move-existing destinations are configured
//! as templates over a small token vocabulary evaluated against the file
//! being handled. Done-file names use a restricted variant of the same
//! syntax so a data file and its completion marker can be matched both ways.

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::model::SourceFile;

/// Tokens understood by [`NamePattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// `${file:name}` — relative name, including any sub-directories.
    Name,
    /// `${file:name.noext}` — relative name with the extension removed.
    NameNoExt,
    /// `${file:onlyname}` — final path segment.
    OnlyName,
    /// `${file:onlyname.noext}` — final segment with the extension removed.
    OnlyNameNoExt,
    /// `${file:ext}` — extension of the final segment, without the dot.
    Ext,
    /// `${file:parent}` — directory part of the relative name.
    Parent,
}

fn parse_tokens(pattern: &str) -> CoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = pattern;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            tokens.push(Token::Literal(rest[..start].to_string()));
        }
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            return Err(CoreError::UnknownToken {
                token: after.to_string(),
            });
        };
        let token = &after[2..end];
        tokens.push(match token {
            "file:name" => Token::Name,
            "file:name.noext" => Token::NameNoExt,
            "file:onlyname" => Token::OnlyName,
            "file:onlyname.noext" => Token::OnlyNameNoExt,
            "file:ext" => Token::Ext,
            "file:parent" => Token::Parent,
            other => {
                return Err(CoreError::UnknownToken {
                    token: format!("${{{other}}}"),
                });
            }
        });
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Literal(rest.to_string()));
    }
    Ok(tokens)
}

fn strip_ext(name: &str) -> &str {
    name.rfind('.').map_or(name, |dot| &name[..dot])
}

fn ext_of(name: &str) -> &str {
    only_name(name)
        .rfind('.')
        .map_or("", |dot| &only_name(name)[dot + 1..])
}

fn only_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|segment| segment.to_str())
        .unwrap_or(name)
}

fn parent_of(name: &str) -> &str {
    Path::new(name)
        .parent()
        .and_then(|parent| parent.to_str())
        .unwrap_or("")
}

/// A parsed naming template, e.g. `archive/${file:name.noext}-done.${file:ext}`.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    tokens: Vec<Token>,
}

impl NamePattern {
    /// Parse a naming template.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownToken`] for unrecognised `${...}` tokens
    /// and [`CoreError::EmptyPattern`] for an empty template.
    pub fn parse(pattern: &str) -> CoreResult<Self> {
        if pattern.is_empty() {
            return Err(CoreError::EmptyPattern {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self {
            raw: pattern.to_string(),
            tokens: parse_tokens(pattern)?,
        })
    }

    /// The template as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the template against a discovered file.
    #[must_use]
    pub fn resolve(&self, file: &SourceFile) -> String {
        self.resolve_name(&file.file_name())
    }

    /// Resolve the template against a relative file name.
    #[must_use]
    pub fn resolve_name(&self, name: &str) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Name => out.push_str(name),
                Token::NameNoExt => out.push_str(strip_ext(name)),
                Token::OnlyName => out.push_str(only_name(name)),
                Token::OnlyNameNoExt => out.push_str(strip_ext(only_name(name))),
                Token::Ext => out.push_str(ext_of(name)),
                Token::Parent => out.push_str(parent_of(name)),
            }
        }
        out
    }
}

/// Done-file naming pattern, restricted to `${file:name}` and
/// `${file:name.noext}` over the final path segment.
#[derive(Debug, Clone)]
pub struct DoneFilePattern {
    raw: String,
    tokens: Vec<Token>,
}

impl DoneFilePattern {
    /// Parse a done-file template.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TokenNotAllowed`] when the template uses tokens
    /// outside the restricted vocabulary, [`CoreError::UnknownToken`] for
    /// unrecognised tokens, and [`CoreError::EmptyPattern`] when empty.
    pub fn parse(pattern: &str) -> CoreResult<Self> {
        if pattern.is_empty() {
            return Err(CoreError::EmptyPattern {
                pattern: pattern.to_string(),
            });
        }
        let tokens = parse_tokens(pattern)?;
        for token in &tokens {
            match token {
                Token::Literal(_) | Token::Name | Token::NameNoExt => {}
                other => {
                    return Err(CoreError::TokenNotAllowed {
                        token: format!("{other:?}"),
                        pattern: pattern.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            raw: pattern.to_string(),
            tokens,
        })
    }

    /// The template as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the done-file name for a data file's final path segment.
    #[must_use]
    pub fn resolve(&self, file_name_only: &str) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Name => out.push_str(file_name_only),
                Token::NameNoExt => out.push_str(strip_ext(file_name_only)),
                _ => {}
            }
        }
        out
    }

    /// Whether the given final path segment is itself a done file.
    ///
    /// With no dynamic token this is an exact match; otherwise the static
    /// remainder of the template is matched as a prefix or suffix depending
    /// on where the token sits.
    #[must_use]
    pub fn matches(&self, file_name_only: &str) -> bool {
        let dynamic = self
            .tokens
            .iter()
            .any(|token| !matches!(token, Token::Literal(_)));
        if !dynamic {
            return self.raw == file_name_only;
        }
        let static_part: String = self
            .tokens
            .iter()
            .filter_map(|token| match token {
                Token::Literal(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        // The static remainder is a suffix exactly when the token sits at
        // the start of the template, a prefix otherwise.
        if self.raw.starts_with("${") {
            file_name_only.ends_with(&static_part)
        } else {
            file_name_only.starts_with(&static_part)
        }
    }
}
