//! Token definitions registered with the streaming tokenizer

use regex::Regex;

use crate::error::{Error, Result};

/// A named, immutable regular-expression pattern the tokenizer scans for.
///
/// The pattern is validated once at construction; repeated queries always
/// return the identical pattern string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDefinition {
    id: String,
    pattern: String,
}

impl TokenDefinition {
    /// Create a definition, rejecting empty or malformed patterns.
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "token definition '{}' has an empty pattern",
                id
            )));
        }
        Regex::new(&pattern).map_err(|e| {
            Error::InvalidArgument(format!("token definition '{}': {}", id, e))
        })?;
        Ok(Self { id, pattern })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
